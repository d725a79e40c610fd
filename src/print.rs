//! Console tables for quotes, leaderboards and settlement summaries.

use stanza::style::{HAlign, Header, MinWidth, Separator, Styles};
use stanza::table::{Col, Row, Table};

use crate::domain::{OddsQuote, PeriodRanking, PODIUM};
use crate::settle::SettlementSummary;

pub fn tabulate_quotes(quotes: &[OddsQuote]) -> Table {
    let mut table = Table::default()
        .with_cols({
            let mut cols = vec![];
            cols.push(Col::new(
                Styles::default().with(MinWidth(12)).with(HAlign::Centred),
            ));
            for _ in 0..PODIUM {
                cols.push(Col::new(
                    Styles::default().with(MinWidth(10)).with(HAlign::Right),
                ));
            }
            cols.push(Col::new(
                Styles::default()
                    .with(Separator(true))
                    .with(MinWidth(5))
                    .with(HAlign::Centred),
            ));
            for _ in 0..PODIUM {
                cols.push(Col::new(
                    Styles::default().with(MinWidth(10)).with(HAlign::Right),
                ));
            }
            cols
        })
        .with_row({
            let mut header_cells = vec!["".into(), "Probability".into()];
            for _ in 1..PODIUM {
                header_cells.push("".into());
            }
            header_cells.push("Odds".into());
            for _ in 0..PODIUM {
                header_cells.push("".into());
            }
            Row::new(
                Styles::default().with(Header(true)).with(Separator(true)),
                header_cells,
            )
        })
        .with_row({
            let mut header_cells = vec!["Competitor".into()];
            for rank in 0..PODIUM {
                header_cells.push(format!("P{}", rank + 1).into());
            }
            header_cells.push("".into());
            for rank in 0..PODIUM {
                header_cells.push(format!("P{}", rank + 1).into());
            }
            Row::new(Styles::default().with(Header(true)), header_cells)
        });

    for quote in quotes {
        let mut row_cells = vec![format!("{}", quote.competitor).into()];
        for rank in 0..PODIUM {
            row_cells.push(format!("{:.6}", quote.probs[rank]).into());
        }
        row_cells.push(format!("{}", quote.competitor).into());
        for rank in 0..PODIUM {
            row_cells.push(format!("{:.2}", quote.odds[rank]).into());
        }
        table.push_row(Row::new(Styles::default(), row_cells));
    }

    table
}

pub fn tabulate_leaderboard(rankings: &[PeriodRanking]) -> Table {
    let mut table = Table::default()
        .with_cols(vec![
            Col::new(Styles::default().with(MinWidth(6)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(10)).with(HAlign::Centred)),
            Col::new(Styles::default().with(MinWidth(10)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(8)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(8)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(8)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(8)).with(HAlign::Right)),
        ])
        .with_row(Row::new(
            Styles::default().with(Header(true)).with(Separator(true)),
            vec![
                "Rank".into(),
                "User".into(),
                "Points".into(),
                "Placed".into(),
                "Won".into(),
                "Perfect".into(),
                "Boosts".into(),
            ],
        ));

    for ranking in rankings {
        let rank = ranking
            .rank
            .map_or_else(|| "-".into(), |rank| format!("{rank}"));
        table.push_row(Row::new(
            Styles::default(),
            vec![
                rank.into(),
                format!("{}", ranking.user).into(),
                format!("{:.2}", ranking.points).into(),
                format!("{}", ranking.wagers_placed).into(),
                format!("{}", ranking.wagers_won).into(),
                format!("{}", ranking.perfect_count).into(),
                format!("{}", ranking.boosts_used).into(),
            ],
        ));
    }

    table
}

pub fn tabulate_settlement(summary: &SettlementSummary) -> Table {
    let mut table = Table::default()
        .with_cols(vec![
            Col::new(Styles::default().with(MinWidth(10)).with(HAlign::Centred)),
            Col::new(Styles::default().with(MinWidth(10)).with(HAlign::Centred)),
            Col::new(Styles::default().with(MinWidth(8)).with(HAlign::Centred)),
            Col::new(Styles::default().with(MinWidth(8)).with(HAlign::Centred)),
            Col::new(Styles::default().with(MinWidth(10)).with(HAlign::Right)),
        ])
        .with_row(Row::new(
            Styles::default().with(Header(true)).with(Separator(true)),
            vec![
                "Wager".into(),
                "User".into(),
                "Status".into(),
                "Perfect".into(),
                "Points".into(),
            ],
        ));

    for event in &summary.events {
        table.push_row(Row::new(
            Styles::default(),
            vec![
                format!("{}", event.wager).into(),
                format!("{}", event.user).into(),
                format!("{}", event.status).into(),
                if event.perfect { "yes" } else { "" }.into(),
                format!("{:.2}", event.points).into(),
            ],
        ));
    }

    table
}

//! Tabular projection of price series.

use polars::prelude::*;

use crate::Price;

/// Columns of a price frame, in order.
pub const PRICE_COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

/// Build a date-ascending OHLCV frame from `prices`.
///
/// The input slice is left untouched; ordering happens on a copy of the
/// references.
pub fn prices_to_frame(prices: &[Price]) -> PolarsResult<DataFrame> {
    let mut rows: Vec<&Price> = prices.iter().collect();
    rows.sort_by_key(|price| price.time);

    let dates: Vec<i32> = rows.iter().map(|p| p.time.days_since_epoch()).collect();
    let opens: Vec<f64> = rows.iter().map(|p| p.open).collect();
    let highs: Vec<f64> = rows.iter().map(|p| p.high).collect();
    let lows: Vec<f64> = rows.iter().map(|p| p.low).collect();
    let closes: Vec<f64> = rows.iter().map(|p| p.close).collect();
    let volumes: Vec<u64> = rows.iter().map(|p| p.volume).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates).cast(&DataType::Date)?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Day;

    fn price(time: &str, close: f64) -> Price {
        Price {
            open: close - 1.0,
            close,
            high: close + 1.0,
            low: close - 2.0,
            volume: 100,
            time: Day::parse(time).expect("valid day"),
        }
    }

    #[test]
    fn frame_is_sorted_ascending_without_touching_input() {
        let prices = vec![
            price("2024-01-03", 3.0),
            price("2024-01-01", 1.0),
            price("2024-01-02", 2.0),
        ];
        let before = prices.clone();

        let df = prices_to_frame(&prices).expect("frame builds");

        assert_eq!(prices, before);
        assert_eq!(df.height(), 3);
        let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, PRICE_COLUMNS.to_vec());

        let closes = df.column("close").unwrap().f64().unwrap();
        assert_eq!(closes.get(0), Some(1.0));
        assert_eq!(closes.get(2), Some(3.0));

        let days = df
            .column("date")
            .unwrap()
            .cast(&DataType::Int32)
            .unwrap();
        let days = days.i32().unwrap();
        assert_eq!(
            days.get(0),
            Some(Day::parse("2024-01-01").unwrap().days_since_epoch())
        );
    }

    #[test]
    fn empty_input_gives_empty_frame() {
        let df = prices_to_frame(&[]).expect("empty frame builds");
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 6);
    }
}

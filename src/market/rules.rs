//! Market & Symbol Rules (spec.md §4.1).
//!
//! Pure, I/O-free classification of a symbol into a `Market`, its short-sale
//! permission, and its trading-hour window. Grounded on the teacher's
//! `market/types.rs` pure-data style, generalized from pool/pair metadata to
//! symbol-suffix classification.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// The market a symbol trades on, derived purely from its suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Market {
    Us,
    CnShanghai,
    CnShenzhen,
    Hk,
    /// Unknown suffix. Documented best-effort fallback (spec.md §4.1): always
    /// open, shorting allowed.
    Other,
}

impl Market {
    /// Classifies a symbol by suffix. `.SS` → Shanghai, `.SZ` → Shenzhen,
    /// `.HK` → Hong Kong; anything else (including no suffix) → `US` unless
    /// it carries no recognizable suffix at all, in which case `Other`.
    ///
    /// The spec draws a line between "US" (a known, named market) and
    /// "OTHER" (nothing recognized); this implementation treats any symbol
    /// without one of the three China/HK suffixes as `US` UNLESS it matches
    /// no alphabetic ticker shape at all (empty string), which falls back to
    /// `Other` per §4.1's "unknown suffix ⇒ OTHER" failure mode.
    pub fn classify(symbol: &str) -> Market {
        if symbol.is_empty() {
            return Market::Other;
        }
        let upper = symbol.to_ascii_uppercase();
        if upper.ends_with(".SS") {
            Market::CnShanghai
        } else if upper.ends_with(".SZ") {
            Market::CnShenzhen
        } else if upper.ends_with(".HK") {
            Market::Hk
        } else {
            Market::Us
        }
    }

    /// Whether short selling (placing a SELL order with no covering
    /// position) is permitted on this market (spec.md §4.1 and §8 invariant
    /// 3).
    pub fn allows_short(self) -> bool {
        match self {
            Market::Us => true,
            Market::CnShanghai | Market::CnShenzhen | Market::Hk => false,
            // Documented best-effort default; asserted by a test.
            Market::Other => true,
        }
    }

    /// The market's trading window in its own local time zone.
    pub fn trading_window(self) -> TradingWindow {
        match self {
            Market::Us => TradingWindow::weekday_local(
                Tz::America__New_York,
                (9, 30),
                (16, 0),
            ),
            Market::CnShanghai | Market::CnShenzhen | Market::Hk => {
                TradingWindow::weekday_local(Tz::Asia__Shanghai, (9, 30), (15, 0))
            }
            // Documented best-effort default: always open (no hours gate).
            Market::Other => TradingWindow::AlwaysOpen,
        }
    }

    /// Convenience: is this symbol's market open at `instant`?
    pub fn is_open_at(self, instant: DateTime<Utc>) -> bool {
        self.trading_window().is_open_at(instant)
    }
}

/// A market's trading-hour window. Holidays are not modeled (spec.md §9 Open
/// Question #3, documented gap — a real deployment needs a holiday-calendar
/// port).
#[derive(Clone, Debug)]
pub enum TradingWindow {
    /// Open every Mon–Fri between `open` and `close`, expressed in `tz`.
    Weekday {
        tz: Tz,
        open: (u32, u32),
        close: (u32, u32),
    },
    /// Always open. Used for the `Other` market fallback.
    AlwaysOpen,
}

impl TradingWindow {
    fn weekday_local(tz: Tz, open: (u32, u32), close: (u32, u32)) -> Self {
        TradingWindow::Weekday { tz, open, close }
    }

    pub fn is_open_at(&self, instant: DateTime<Utc>) -> bool {
        match self {
            TradingWindow::AlwaysOpen => true,
            TradingWindow::Weekday { tz, open, close } => {
                let local = tz.from_utc_datetime(&instant.naive_utc());
                if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
                    return false;
                }
                let minutes = local.hour() * 60 + local.minute();
                let open_minutes = open.0 * 60 + open.1;
                let close_minutes = close.0 * 60 + close.1;
                minutes >= open_minutes && minutes <= close_minutes
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn classifies_shanghai_shenzhen_hk_and_us() {
        assert_eq!(Market::classify("600298.SS"), Market::CnShanghai);
        assert_eq!(Market::classify("000001.SZ"), Market::CnShenzhen);
        assert_eq!(Market::classify("0700.HK"), Market::Hk);
        assert_eq!(Market::classify("AAPL"), Market::Us);
    }

    #[test]
    fn unknown_suffix_defaults_to_other_always_open_allows_short() {
        // Empty symbol is the degenerate "unknown suffix" case; must default
        // to OTHER with always-open + short-allowed, per spec.md §4.1.
        let m = Market::classify("");
        assert_eq!(m, Market::Other);
        assert!(m.allows_short());
        // Saturday at 3am should still be "open" for OTHER.
        let sat = Utc.with_ymd_and_hms(2026, 8, 1, 3, 0, 0).unwrap();
        assert!(m.is_open_at(sat));
    }

    #[test]
    fn china_markets_disallow_short() {
        assert!(!Market::CnShanghai.allows_short());
        assert!(!Market::CnShenzhen.allows_short());
        assert!(!Market::Hk.allows_short());
        assert!(Market::Us.allows_short());
    }

    #[test]
    fn china_window_is_closed_on_weekend() {
        // 2026-08-01 is a Saturday.
        let sat = Utc.with_ymd_and_hms(2026, 8, 1, 6, 0, 0).unwrap();
        assert!(!Market::CnShanghai.is_open_at(sat));
    }

    #[test]
    fn china_window_open_inside_trading_hours() {
        // 2026-07-27 is a Monday. 09:45 Beijing == 01:45 UTC.
        let t = Utc.with_ymd_and_hms(2026, 7, 27, 1, 45, 0).unwrap();
        assert!(Market::CnShanghai.is_open_at(t));
    }

    #[test]
    fn china_window_closed_outside_trading_hours() {
        // 16:00 Beijing == 08:00 UTC, after the 15:00 close.
        let t = Utc.with_ymd_and_hms(2026, 7, 27, 8, 0, 0).unwrap();
        assert!(!Market::CnShanghai.is_open_at(t));
    }

    #[test]
    fn us_window_open_inside_trading_hours() {
        // 10:00 America/New_York in late July (EDT, UTC-4) == 14:00 UTC.
        let t = Utc.with_ymd_and_hms(2026, 7, 27, 14, 0, 0).unwrap();
        assert!(Market::Us.is_open_at(t));
    }
}

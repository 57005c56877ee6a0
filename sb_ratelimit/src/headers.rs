//! Rate-limit header parsing
//!
//! The server announces its quota policy on every response:
//!
//! - `x-app-rate-limit: 20:1,100:120` - 20 calls per second and 100 per two minutes, per key
//! - `x-method-rate-limit: 2000:10` - per endpoint template
//! - `x-app-rate-limit-count: 5:1,40:120` - how many calls the server has counted in each window
//!
//! The server never returns individual call times, only one aggregate count per
//! window, so the local usage log is rebuilt from those counts after each
//! response. The rebuilt history is an approximation, not a replay.

use std::time::Duration;

use http::HeaderMap;
use tokio::time::Instant;

use crate::error::RateLimitError;
use crate::error::Result;
use crate::time::instant_before;
use crate::time::secs_to_duration;
use crate::window::QuotaWindow;

pub const APP_RATE_LIMIT: &str = "x-app-rate-limit";
pub const METHOD_RATE_LIMIT: &str = "x-method-rate-limit";
pub const APP_RATE_LIMIT_COUNT: &str = "x-app-rate-limit-count";
pub const METHOD_RATE_LIMIT_COUNT: &str = "x-method-rate-limit-count";
pub const RATE_LIMIT_TYPE: &str = "x-rate-limit-type";
pub const RETRY_AFTER: &str = "retry-after";

/// Gap placed between one window's synthesized entries and the next longer window's
const WINDOW_GAP: Duration = Duration::from_secs(1);

/// Most entries synthesized for one scope, whatever the count header claims
pub const MAX_SYNTHESIZED_CALLS: u32 = 1 << 16;

/// Synthesized call timestamps per scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub app: Vec<Instant>,
    pub method: Vec<Instant>,

    /// The response carried `x-app-rate-limit-count`; otherwise `app` is only the seeded `now`
    pub app_reported: bool,

    /// The response carried `x-method-rate-limit-count`
    pub method_reported: bool,
}

/// Quota information extracted from one response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLimits {
    /// Application windows; empty when the response carried no app limit header
    pub app: Vec<QuotaWindow>,

    /// Method windows; empty when the response carried no method limit header
    pub method: Vec<QuotaWindow>,

    /// Usage history reconstructed from the count headers
    pub usage: Usage,
}

impl ParsedLimits {
    /// Limits for a response without any usable rate-limit headers: no policy
    /// change, and the call that produced it happened `now`
    pub fn observed_at(now: Instant) -> Self {
        Self { app: Vec::new(), method: Vec::new(), usage: Usage { app: vec![now], method: vec![now], ..Default::default() } }
    }
}

/// Which quota a 429 was charged against, from `x-rate-limit-type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitType {
    Application,
    Method,
    /// Throttled by the backing service rather than a key quota
    Service,
}

/// Parse the quota headers of a response
///
/// Absent limit headers give an empty window list. An absent count header
/// seeds that scope's usage with `now`, so the call itself is never under-counted.
pub fn parse_headers(headers: &HeaderMap, now: Instant) -> Result<ParsedLimits> {
    let app = match header_str(headers, APP_RATE_LIMIT)? {
        Some(value) => windows(APP_RATE_LIMIT, value)?,
        None => Vec::new(),
    };
    let method = match header_str(headers, METHOD_RATE_LIMIT)? {
        Some(value) => windows(METHOD_RATE_LIMIT, value)?,
        None => Vec::new(),
    };

    let app_count = header_str(headers, APP_RATE_LIMIT_COUNT)?;
    let app_usage = match app_count {
        Some(value) => synthesize_usage(pairs(APP_RATE_LIMIT_COUNT, value)?, &app, now),
        None => vec![now],
    };
    let method_count = header_str(headers, METHOD_RATE_LIMIT_COUNT)?;
    let method_usage = match method_count {
        Some(value) => synthesize_usage(pairs(METHOD_RATE_LIMIT_COUNT, value)?, &method, now),
        None => vec![now],
    };

    let usage = Usage { app: app_usage, method: method_usage, app_reported: app_count.is_some(), method_reported: method_count.is_some() };
    Ok(ParsedLimits { app, method, usage })
}

/// `Retry-After` in delta-seconds, if present and well formed
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// The quota a throttled response was charged against
pub fn limit_type(headers: &HeaderMap) -> Option<LimitType> {
    let value = headers.get(RATE_LIMIT_TYPE)?.to_str().ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "application" => Some(LimitType::Application),
        "method" => Some(LimitType::Method),
        "service" => Some(LimitType::Service),
        _ => None,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>> {
    match headers.get(name) {
        Some(value) => value.to_str().map(Some).map_err(|_| malformed(name, &String::from_utf8_lossy(value.as_bytes()))),
        None => Ok(None),
    }
}

fn windows(name: &'static str, value: &str) -> Result<Vec<QuotaWindow>> {
    Ok(pairs(name, value)?.into_iter().map(|(limit, secs)| QuotaWindow::from_secs(limit, secs)).collect())
}

/// Split `a:b,c:d` into `(a, b)` pairs
fn pairs(name: &'static str, value: &str) -> Result<Vec<(u32, u64)>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (count, secs) = pair.split_once(':').ok_or_else(|| malformed(name, value))?;
            let count = count.trim().parse::<u32>().map_err(|_| malformed(name, value))?;
            let secs = secs.trim().parse::<u64>().map_err(|_| malformed(name, value))?;
            Ok((count, secs))
        })
        .collect()
}

/// Rebuild a usage history from per-window counts
///
/// Counts are walked from the shortest window to the longest (stable, so ties
/// keep header order). Calls already placed for a shorter window are not placed
/// again; the remainder of each longer window's count lands just outside the
/// previous window so it does not inflate the shorter window's view.
///
/// A count above the limit of its window (when the same response announced
/// one) is clamped to that limit, and no scope gets more than
/// [`MAX_SYNTHESIZED_CALLS`] entries.
fn synthesize_usage(mut counts: Vec<(u32, u64)>, windows: &[QuotaWindow], now: Instant) -> Vec<Instant> {
    counts.sort_by_key(|(_, secs)| *secs);

    let mut usage = Vec::new();
    let mut accounted = 0u32;
    let mut offset = Duration::ZERO;
    for (count, secs) in counts {
        let limit = windows.iter().find(|window| window.duration == secs_to_duration(secs)).map_or(u32::MAX, |window| window.limit);
        let count = count.min(limit).min(MAX_SYNTHESIZED_CALLS);
        let extra = count.saturating_sub(accounted);
        let at = instant_before(now, offset);
        usage.extend(std::iter::repeat_n(at, extra as usize));

        accounted = accounted.max(count);
        offset = secs_to_duration(secs) + WINDOW_GAP;
    }
    usage
}

fn malformed(name: &'static str, value: &str) -> RateLimitError {
    RateLimitError::MalformedHeader { name, value: value.to_string() }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_parse_app_limits_and_counts() {
        let now = Instant::now();
        let map = headers(&[(APP_RATE_LIMIT, "20:1,100:120"), (APP_RATE_LIMIT_COUNT, "5:1,40:120")]);

        let parsed = parse_headers(&map, now).unwrap();

        assert_eq!(parsed.app, vec![QuotaWindow::new(20, Duration::from_millis(1000)), QuotaWindow::new(100, Duration::from_millis(120_000))]);
        assert_eq!(parsed.usage.app.len(), 40);

        let within_second = parsed.usage.app.iter().filter(|at| now.duration_since(**at) < Duration::from_secs(1)).count();
        let older = parsed
            .usage
            .app
            .iter()
            .filter(|at| {
                let age = now.duration_since(**at);
                age >= Duration::from_secs(1) && age < Duration::from_secs(120)
            })
            .count();
        assert_eq!(within_second, 5);
        assert_eq!(older, 35);
    }

    #[test]
    fn test_counts_sorted_by_duration() {
        let now = Instant::now();
        let map = headers(&[(METHOD_RATE_LIMIT_COUNT, "40:120,5:1")]);

        let parsed = parse_headers(&map, now).unwrap();

        let recent = parsed.usage.method.iter().filter(|at| **at == now).count();
        assert_eq!(recent, 5);
        assert_eq!(parsed.usage.method.len(), 40);
    }

    #[test]
    fn test_absent_headers_seed_now() {
        let now = Instant::now();
        let parsed = parse_headers(&HeaderMap::new(), now).unwrap();

        assert!(parsed.app.is_empty());
        assert!(parsed.method.is_empty());
        assert_eq!(parsed.usage.app, vec![now]);
        assert_eq!(parsed.usage.method, vec![now]);
        assert!(!parsed.usage.app_reported && !parsed.usage.method_reported);
        assert_eq!(parsed, ParsedLimits::observed_at(now));
    }

    #[test]
    fn test_zero_counts_synthesize_nothing() {
        let now = Instant::now();
        let map = headers(&[(APP_RATE_LIMIT_COUNT, "0:1,0:120")]);

        let parsed = parse_headers(&map, now).unwrap();
        assert!(parsed.usage.app.is_empty());
    }

    #[test]
    fn test_equal_durations_do_not_double_count() {
        let now = Instant::now();
        let map = headers(&[(APP_RATE_LIMIT_COUNT, "3:10,7:10")]);

        let parsed = parse_headers(&map, now).unwrap();
        assert_eq!(parsed.usage.app.len(), 7);
    }

    #[test]
    fn test_oversized_count_clamped_to_limit() {
        let now = Instant::now();
        let map = headers(&[(APP_RATE_LIMIT, "20:1"), (APP_RATE_LIMIT_COUNT, "4294967295:1")]);

        let parsed = parse_headers(&map, now).unwrap();
        assert_eq!(parsed.usage.app.len(), 20);
    }

    #[test]
    fn test_oversized_count_without_limit_is_capped() {
        let now = Instant::now();
        let map = headers(&[(METHOD_RATE_LIMIT_COUNT, "4294967295:1")]);

        let parsed = parse_headers(&map, now).unwrap();
        assert_eq!(parsed.usage.method.len(), MAX_SYNTHESIZED_CALLS as usize);
    }

    #[test]
    fn test_huge_window_clamped() {
        let now = Instant::now();
        let map = headers(&[(APP_RATE_LIMIT, "5:18446744073709551615"), (APP_RATE_LIMIT_COUNT, "2:18446744073709551615")]);

        let parsed = parse_headers(&map, now).unwrap();
        assert_eq!(parsed.app, vec![QuotaWindow::from_secs(5, crate::time::MAX_WINDOW_SECS)]);
        assert_eq!(parsed.usage.app, vec![now, now]);
    }

    #[test]
    fn test_deterministic() {
        let now = Instant::now();
        let map = headers(&[(METHOD_RATE_LIMIT, "2000:10"), (METHOD_RATE_LIMIT_COUNT, "12:10")]);

        assert_eq!(parse_headers(&map, now).unwrap(), parse_headers(&map, now).unwrap());
    }

    #[test]
    fn test_malformed_header() {
        let now = Instant::now();
        let map = headers(&[(APP_RATE_LIMIT, "20-1")]);

        let err = parse_headers(&map, now).unwrap_err();
        assert_eq!(err, RateLimitError::MalformedHeader { name: APP_RATE_LIMIT, value: "20-1".to_string() });
    }

    #[test]
    fn test_whitespace_tolerated() {
        let now = Instant::now();
        let map = headers(&[(APP_RATE_LIMIT, " 20:1 , 100:120 ")]);

        let parsed = parse_headers(&map, now).unwrap();
        assert_eq!(parsed.app.len(), 2);
    }

    #[test]
    fn test_retry_after() {
        assert_eq!(retry_after(&headers(&[(RETRY_AFTER, "2")])), Some(Duration::from_secs(2)));
        assert_eq!(retry_after(&headers(&[(RETRY_AFTER, "soon")])), None);
        assert_eq!(retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn test_limit_type() {
        assert_eq!(limit_type(&headers(&[(RATE_LIMIT_TYPE, "application")])), Some(LimitType::Application));
        assert_eq!(limit_type(&headers(&[(RATE_LIMIT_TYPE, "method")])), Some(LimitType::Method));
        assert_eq!(limit_type(&headers(&[(RATE_LIMIT_TYPE, "service")])), Some(LimitType::Service));
        assert_eq!(limit_type(&HeaderMap::new()), None);
    }
}

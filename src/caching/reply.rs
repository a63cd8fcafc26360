//! Response-side helpers: `ETag` and `Expires`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Datelike, Utc};

use crate::{Response, http::header};

/// How long an etag is remembered when no lifetime is given: one hour.
pub const DEFAULT_ETAG_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Random bytes behind a generated etag; 24 characters once encoded.
const ETAG_ENTROPY_BYTES: usize = 18;

/// How long the etag on a response should be remembered.
///
/// Attached to the response's extensions by [`CachingReply::etag`] and
/// consumed by the etag ledger once the handler has returned. A zero lifetime
/// means the etag is sent but not remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtagLifetime(pub Duration);

/// Rendered for a time the calendar cannot represent.
pub const INVALID_DATE: &str = "Invalid Date";

/// Value for the `Expires` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expires {
    /// Rendered as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
    /// See [`http_date`] for times outside years 0000 to 9999.
    At(SystemTime),
    /// Written as-is, without validation.
    Raw(String),
}

impl Expires {
    pub fn to_header_value(&self) -> String {
        match self {
            Self::At(time) => http_date(*time),
            Self::Raw(raw) => raw.clone(),
        }
    }
}

impl From<SystemTime> for Expires {
    fn from(time: SystemTime) -> Self {
        Self::At(time)
    }
}

impl From<&str> for Expires {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_owned())
    }
}

impl From<String> for Expires {
    fn from(raw: String) -> Self {
        Self::Raw(raw)
    }
}

/// Formats `time` as an HTTP-date, truncated to the second.
///
/// Years past 9999 keep all their digits and years before 0000 get a leading
/// `-`, so any time is accepted. Times beyond the calendar's range render as
/// [`INVALID_DATE`].
///
/// ```
/// use std::time::{Duration, UNIX_EPOCH};
/// use rttp_caching::caching::http_date;
///
/// assert_eq!(http_date(UNIX_EPOCH - Duration::from_secs(1)), "Wed, 31 Dec 1969 23:59:59 GMT");
/// ```
pub fn http_date(time: SystemTime) -> String {
    let date = unix_timestamp(time)
        .and_then(|(secs, nanos)| DateTime::<Utc>::from_timestamp(secs, nanos));
    let Some(date) = date else {
        return INVALID_DATE.to_owned();
    };
    let year = date.year();
    let sign = if year < 0 { "-" } else { "" };
    format!(
        "{} {sign}{:04} {}",
        date.format("%a, %d %b"),
        year.unsigned_abs(),
        date.format("%H:%M:%S GMT"),
    )
}

// Seconds and nanoseconds relative to the epoch, flooring times before it.
fn unix_timestamp(time: SystemTime) -> Option<(i64, u32)> {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => Some((i64::try_from(after.as_secs()).ok()?, after.subsec_nanos())),
        Err(err) => {
            let before = err.duration();
            let secs = i64::try_from(before.as_secs()).ok()?;
            match before.subsec_nanos() {
                0 => Some((-secs, 0)),
                nanos => Some((-secs - 1, 1_000_000_000 - nanos)),
            }
        }
    }
}

/// Generates an unguessable etag: 18 bytes from the thread-local CSPRNG,
/// base64url-encoded without padding.
pub fn random_etag() -> String {
    let bytes: [u8; ETAG_ENTROPY_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

// Lifetimes are whole milliseconds; anything finer is rejected like a
// missing lifetime.
fn etag_lifetime(lifetime: Option<Duration>) -> Duration {
    match lifetime {
        Some(lifetime) if lifetime.subsec_nanos() % 1_000_000 == 0 => lifetime,
        _ => DEFAULT_ETAG_LIFETIME,
    }
}

/// Caching helpers for [`Response`], chainable with its builder methods.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, UNIX_EPOCH};
/// use rttp_caching::{Response, StatusCode};
/// use rttp_caching::caching::{CachingReply, EtagLifetime, Expires};
///
/// let response = Response::new(StatusCode::Ok)
///     .etag("123456", Duration::from_millis(300))
///     .expires(Expires::from(UNIX_EPOCH + Duration::from_secs(784111777)))
///     .body("hello");
///
/// assert_eq!(response.headers().get("etag"), Some("123456"));
/// assert_eq!(response.headers().get("expires"), Some("Sun, 06 Nov 1994 08:49:37 GMT"));
/// assert_eq!(
///     response.extensions().get::<EtagLifetime>(),
///     Some(&EtagLifetime(Duration::from_millis(300))),
/// );
/// ```
pub trait CachingReply: Sized {
    /// Sets the `ETag` header and records how long it should be remembered.
    ///
    /// A missing or empty `value` is replaced by [`random_etag`]. A missing
    /// lifetime, or one that is not a whole number of milliseconds, becomes
    /// [`DEFAULT_ETAG_LIFETIME`]. Nothing reaches the cache until the response
    /// travels back out through the conditional-GET middleware.
    fn etag<'v>(
        self,
        value: impl Into<Option<&'v str>>,
        lifetime: impl Into<Option<Duration>>,
    ) -> Self;

    /// Sets the `Expires` header. `None` leaves the headers untouched.
    fn expires(self, expires: impl Into<Option<Expires>>) -> Self;
}

impl CachingReply for Response {
    fn etag<'v>(
        mut self,
        value: impl Into<Option<&'v str>>,
        lifetime: impl Into<Option<Duration>>,
    ) -> Self {
        let etag = match value.into() {
            Some(value) if !value.is_empty() => value.to_owned(),
            _ => random_etag(),
        };
        self.set_header(header::ETAG, etag);
        self.extensions_mut()
            .insert(EtagLifetime(etag_lifetime(lifetime.into())));
        self
    }

    fn expires(mut self, expires: impl Into<Option<Expires>>) -> Self {
        if let Some(expires) = expires.into() {
            self.set_header(header::EXPIRES, expires.to_header_value());
        }
        self
    }
}

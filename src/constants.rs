/// Timestamp format RCRAInfo expects for search windows
pub const RCRA_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Days counted per "year" when defaulting the search window start.
/// Deliberately not calendar-exact.
pub const DAYS_PER_SEARCH_YEAR: i64 = 360;

/// Years of history searched when no start date is given
pub const DEFAULT_SEARCH_YEARS: i64 = 3;

pub const DEFAULT_SEARCH_WINDOW_DAYS: i64 = DAYS_PER_SEARCH_YEAR * DEFAULT_SEARCH_YEARS;

pub const DEFAULT_RCRAINFO_BASE_URL: &str = "https://rcrainfopreprod.epa.gov/rcrainfo/rest";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_USERNAME: &str = "trak_sync";

pub const DEFAULT_LOG_DIRECTORY: &str = "logs";
pub const DEFAULT_LOG_FILE_PREFIX: &str = "trak_sync.log";
pub const DEFAULT_LOG_DIRECTIVE: &str = "trak_sync=info";

/// Manifest tracking numbers are nine digits followed by a three letter suffix
pub const MTN_PATTERN: &str = r"^[0-9]{9}[A-Z]{3}$";

use chrono::{DateTime, SubsecRound, Utc};

/// Current time truncated to microseconds, the precision Postgres keeps,
/// so a freshly returned record compares equal to its stored copy.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

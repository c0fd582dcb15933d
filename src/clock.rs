use chrono::{
    DateTime,
    Datelike,
    Duration,
    TimeZone,
    Utc,
    Weekday,
};

/// Time source for the engine. Production uses [`SystemClock`]; tests drive
/// a [`ManualClock`] to step through a fight deterministically.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Arc::new(std::sync::Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap();
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Start of the encounter week containing `at`: Monday 00:00:00 UTC.
pub fn week_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_monday = at.weekday().num_days_from_monday() as i64;
    let monday = at.date_naive() - Duration::days(days_from_monday);
    let midnight = monday
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time of day");
    Utc.from_utc_datetime(&midnight)
}

/// Unix seconds of the week start, the canonical week key.
pub fn week_key(at: DateTime<Utc>) -> i64 {
    week_start(at).timestamp()
}

fn is_weekend(at: DateTime<Utc>) -> bool {
    matches!(at.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Gate controlling when the encounter is open. The weekend policy is the
/// production schedule; `AlwaysOpen` exists for local runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhasePolicy {
    WeekendOnly,
    AlwaysOpen,
}

impl PhasePolicy {
    pub fn is_open(&self, at: DateTime<Utc>) -> bool {
        match self {
            PhasePolicy::WeekendOnly => is_weekend(at),
            PhasePolicy::AlwaysOpen => true,
        }
    }
}

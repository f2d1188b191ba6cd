#![forbid(unsafe_code)]

/// Surfaced status of a scheduled task. Only `pending`, `cancelled` and
/// `fired` are ever stored; `due` is derived at read time from
/// `fire_at_ms <= now_ms`, so there is no background timer to lose on
/// restart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleStatus {
    Pending,
    Due,
    Cancelled,
    Fired,
}

impl ScheduleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Due => "due",
            ScheduleStatus::Cancelled => "cancelled",
            ScheduleStatus::Fired => "fired",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ScheduleStatusParseError> {
        match value {
            "pending" => Ok(ScheduleStatus::Pending),
            "due" => Ok(ScheduleStatus::Due),
            "cancelled" => Ok(ScheduleStatus::Cancelled),
            "fired" => Ok(ScheduleStatus::Fired),
            _ => Err(ScheduleStatusParseError::Unknown),
        }
    }

    /// Status a reader should see for a stored row at `now_ms`.
    pub fn observed(self, fire_at_ms: i64, now_ms: i64) -> Self {
        match self {
            ScheduleStatus::Pending if fire_at_ms <= now_ms => ScheduleStatus::Due,
            other => other,
        }
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleStatusParseError {
    Unknown,
}

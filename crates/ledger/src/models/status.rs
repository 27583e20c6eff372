use crate::error::{Error, ErrorKind};
use crate::models::timestamp_from_row;
use derive_more::Display;
use std::str::FromStr;
use time::UtcDateTime;

/// Health of a service as shown on the dashboard.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Status {
    #[default]
    #[display("OK")]
    Ok,
    #[display("WARNING")]
    Warning,
    #[display("ERROR")]
    Error,
}
impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}
impl FromStr for Status {
    type Err = ErrorKind;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(Self::Ok),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            _ => Err(ErrorKind::InvalidData("status")),
        }
    }
}

/// A single heartbeat of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub service_name: String,
    pub status: Status,
    pub current_task: Option<String>,
    pub last_heartbeat: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct StatusRow {
    service_name: String,
    status: String,
    current_task: Option<String>,
    last_heartbeat: i64,
}
impl TryFrom<StatusRow> for ServiceStatus {
    type Error = Error;
    fn try_from(row: StatusRow) -> Result<Self, Self::Error> {
        Ok(Self {
            service_name: row.service_name,
            status: row.status.parse()?,
            current_task: row.current_task,
            last_heartbeat: timestamp_from_row(row.last_heartbeat, "heartbeat time")?,
        })
    }
}

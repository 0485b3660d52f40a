//! Background tasks and their status lifecycle.
//!
//! Status moves strictly forward: `queued -> running -> success | error`.
//! Terminal states never change again.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
  Queued,
  Running,
  Success,
  Error,
}

impl TaskStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Queued => "queued",
      Self::Running => "running",
      Self::Success => "success",
      Self::Error => "error",
    }
  }

  pub fn is_terminal(self) -> bool { matches!(self, Self::Success | Self::Error) }

  pub fn can_transition_to(self, next: TaskStatus) -> bool {
    matches!(
      (self, next),
      (Self::Queued, Self::Running)
        | (Self::Running, Self::Success)
        | (Self::Running, Self::Error)
    )
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for TaskStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "queued" => Ok(Self::Queued),
      "running" => Ok(Self::Running),
      "success" => Ok(Self::Success),
      "error" => Ok(Self::Error),
      other => Err(Error::UnknownTaskStatus(other.to_owned())),
    }
  }
}

/// What a task does. Only feature ingestion exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
  IngestFeatures,
}

impl TaskKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::IngestFeatures => "ingest_features",
    }
  }
}

impl fmt::Display for TaskKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for TaskKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "ingest_features" => Ok(Self::IngestFeatures),
      other => Err(Error::UnknownTaskKind(other.to_owned())),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
  pub id:        i64,
  pub genome_id: String,
  pub kind:      TaskKind,
  pub status:    TaskStatus,
  /// Human-readable outcome, set when the task finishes.
  pub message:   Option<String>,
  pub created:   DateTime<Utc>,
}

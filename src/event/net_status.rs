use super::target::{Target, TargetRef};
use super::{Event, EventBase};

use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub const NET_STATUS: &str = "netStatus";

pub mod level {
  pub const STATUS: &str = "status";
  pub const WARNING: &str = "warning";
  pub const ERROR: &str = "error";
}

/// A free-form value in a [NetStatusEvent]'s info map.
#[derive(Clone, Debug, PartialEq)]
pub enum InfoValue {
  Bool(bool),
  Int(i64),
  Float(f64),
  Text(String),
  List(Vec<InfoValue>),
  Map(HashMap<String, InfoValue>),
}

impl From<bool> for InfoValue {
  fn from(value: bool) -> Self {
    InfoValue::Bool(value)
  }
}

impl From<i64> for InfoValue {
  fn from(value: i64) -> Self {
    InfoValue::Int(value)
  }
}

impl From<f64> for InfoValue {
  fn from(value: f64) -> Self {
    InfoValue::Float(value)
  }
}

impl From<&str> for InfoValue {
  fn from(value: &str) -> Self {
    InfoValue::Text(value.to_owned())
  }
}

impl From<String> for InfoValue {
  fn from(value: String) -> Self {
    InfoValue::Text(value)
  }
}

pub type Info = HashMap<String, InfoValue>;

/// Dispatched when a connection reports its status.
#[derive(Clone, Debug)]
pub struct NetStatusEvent {
  base: EventBase,
  pub level: String,
  pub code: String,
  pub description: String,
  pub info: Info,
}

impl NetStatusEvent {
  pub fn new<S>(
    event_type: impl Into<String>,
    source: &Arc<S>,
    level: impl Into<String>,
    code: impl Into<String>,
    description: impl Into<String>,
    info: Info,
  ) -> Self
  where
    S: Target + 'static,
  {
    NetStatusEvent {
      base: EventBase::new(event_type, Some(TargetRef::new(source))),
      level: level.into(),
      code: code.into(),
      description: description.into(),
      info,
    }
  }

  pub fn detached(
    event_type: impl Into<String>,
    level: impl Into<String>,
    code: impl Into<String>,
    description: impl Into<String>,
    info: Info,
  ) -> Self {
    NetStatusEvent {
      base: EventBase::new(event_type, None),
      level: level.into(),
      code: code.into(),
      description: description.into(),
      info,
    }
  }
}

impl Event for NetStatusEvent {
  fn base(&self) -> &EventBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut EventBase {
    &mut self.base
  }

  fn clone_event(&self) -> Box<dyn Event> {
    Box::new(NetStatusEvent {
      base: self.base.fresh(),
      level: self.level.clone(),
      code: self.code.clone(),
      description: self.description.clone(),
      info: self.info.clone(),
    })
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

impl Display for NetStatusEvent {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "[NetStatusEvent type={} level={} code={} description={}]",
      self.event_type(),
      self.level,
      self.code,
      self.description
    )
  }
}

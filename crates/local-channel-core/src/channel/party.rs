//! Party identification carried by channels: caller, connected line,
//! redirecting and dialed number.
//!
//! `None` fields are "not valid". Updates are deltas: only the fields they
//! carry overwrite the accumulated state.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyId {
    pub name: Option<String>,
    pub number: Option<String>,
    pub subaddress: Option<String>,
}

impl PartyId {
    pub fn new(name: Option<&str>, number: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_string),
            number: number.map(str::to_string),
            subaddress: None,
        }
    }

    /// Any field explicitly set
    pub fn is_set(&self) -> bool {
        self.name.is_some() || self.number.is_some() || self.subaddress.is_some()
    }

    /// Apply the fields present in `update`
    pub fn merge(&mut self, update: &PartyId) {
        if update.name.is_some() {
            self.name = update.name.clone();
        }
        if update.number.is_some() {
            self.number = update.number.clone();
        }
        if update.subaddress.is_some() {
            self.subaddress = update.subaddress.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyCaller {
    pub id: PartyId,
    pub ani: PartyId,
}

impl PartyCaller {
    pub fn is_set(&self) -> bool {
        self.id.is_set() || self.ani.is_set()
    }

    /// Caller party built from a connected line
    pub fn from_connected(connected: &PartyConnectedLine) -> Self {
        Self {
            id: connected.id.clone(),
            ani: connected.ani.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyConnectedLine {
    pub id: PartyId,
    pub ani: PartyId,
    /// Reason for the update (opaque to the channel layer)
    pub source: Option<u32>,
}

impl PartyConnectedLine {
    /// Connected line built from a caller party
    pub fn from_caller(caller: &PartyCaller) -> Self {
        Self {
            id: caller.id.clone(),
            ani: caller.ani.clone(),
            source: None,
        }
    }

    pub fn merge(&mut self, update: &PartyConnectedLine) {
        self.id.merge(&update.id);
        self.ani.merge(&update.ani);
        if update.source.is_some() {
            self.source = update.source;
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(bincode::serialize(self)?))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRedirecting {
    pub from: PartyId,
    pub to: PartyId,
    pub count: u32,
    pub reason: Option<String>,
}

impl PartyRedirecting {
    pub fn is_set(&self) -> bool {
        self.from.is_set() || self.to.is_set()
    }

    pub fn merge(&mut self, update: &PartyRedirecting) {
        self.from.merge(&update.from);
        self.to.merge(&update.to);
        if update.count != 0 {
            self.count = update.count;
        }
        if update.reason.is_some() {
            self.reason = update.reason.clone();
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(bincode::serialize(self)?))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyDialed {
    pub number: Option<String>,
    pub subaddress: Option<String>,
}

impl PartyDialed {
    pub fn is_set(&self) -> bool {
        self.number.is_some() || self.subaddress.is_some()
    }
}

//! Read models for `GET /api/<key>` and `GET /api/<key>/config`.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::models::api_key::WhitelistEntry;

/// Software update block of the config snapshot.
#[derive(Debug, Serialize)]
pub struct SwUpdate {
    pub version: String,
    pub updatestate: u8,
    pub url: String,
    pub text: String,
    pub notify: bool,
}

/// The config object exposed to clients.
///
/// The whitelist carries every issued key, so this snapshot must only be
/// served to authenticated callers.
#[derive(Debug, Serialize)]
pub struct ConfigSnapshot {
    pub name: String,
    pub uuid: String,
    pub ipaddress: String,
    pub netmask: String,
    pub mac: String,
    pub port: u16,
    pub dhcp: bool,
    pub gateway: String,
    pub proxyaddress: String,
    pub proxyport: u16,
    pub utc: String,
    pub whitelist: BTreeMap<String, WhitelistEntry>,
    pub swversion: String,
    pub fwversion: String,
    pub fwneedupdate: bool,
    pub announceurl: String,
    pub announceinterval: u32,
    pub rfconnected: bool,
    pub permitjoin: u8,
    pub otauactive: bool,
    pub otaustate: &'static str,
    pub groupdelay: u64,
    pub discovery: bool,
    pub updatechannel: String,
    pub swupdate: SwUpdate,
    pub linkbutton: bool,
    pub portalservices: bool,
}

/// Combined snapshot; the inventory maps are passed through untouched.
#[derive(Debug, Serialize)]
pub struct FullState {
    pub lights: Map<String, Value>,
    pub groups: Map<String, Value>,
    pub config: ConfigSnapshot,
    pub schedules: Map<String, Value>,
}

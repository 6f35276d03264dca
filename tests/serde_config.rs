// ==============================================
// SERDE CONFIG TESTS (integration, `serde` feature)
// ==============================================

#![cfg(feature = "serde")]

use peercache::builder::{GroupBuilder, GroupConfig};
use peercache::peers::{FetchRequest, FetchResponse};
use peercache::registry::GroupRegistry;
use peercache::traits::LoaderFn;

#[test]
fn group_config_reads_from_json() {
    let config: GroupConfig =
        serde_json::from_str(r#"{ "name": "scores", "capacity_bytes": 2048 }"#).unwrap();
    assert_eq!(config, GroupConfig::new("scores", 2048));

    let registry = GroupRegistry::new();
    let group = GroupBuilder::from_config(config)
        .loader(LoaderFn::new(|key: &str| Ok(key.as_bytes().to_vec())))
        .build(&registry);
    assert_eq!(group.capacity_bytes(), 2048);
}

#[test]
fn missing_fields_use_defaults() {
    let config: GroupConfig = serde_json::from_str(r#"{ "name": "scores" }"#).unwrap();
    assert_eq!(config.capacity_bytes, 0);
}

#[test]
fn fetch_envelope_round_trips() {
    let request = FetchRequest::new("scores", "Tom");
    let json = serde_json::to_string(&request).unwrap();
    assert_eq!(json, r#"{"group":"scores","key":"Tom"}"#);
    assert_eq!(serde_json::from_str::<FetchRequest>(&json).unwrap(), request);

    let response: FetchResponse = serde_json::from_str(r#"{"value":[54,51,48]}"#).unwrap();
    assert_eq!(response.value, b"630".to_vec());
}

use bson::doc;
use ipsieve::{aggregate, AddressExtractor, AddressMap, AliasTable, Payload, ResourceRecord};
use serde_json::json;

fn scenario_payloads() -> Vec<Payload> {
    let ordered = doc! {
        "PublicIpAddress": "1.2.3.4",
        "NetworkInterfaces": [ { "Association": { "PublicIp": "5.6.7.8" } } ]
    };

    vec![
        Payload::Json(json!({
            "publicipaddress": "1.2.3.4",
            "networkinterfaces": [{"association": {"publicip": "5.6.7.8"}}]
        })),
        Payload::encode(&ordered).unwrap(),
        Payload::from(ordered),
        Payload::Json(json!([
            {"Key": "PublicIpAddress", "Value": "1.2.3.4"},
            {"Key": "NetworkInterfaces", "Value": [
                [{"Key": "Association", "Value": [{"Key": "PublicIp", "Value": "5.6.7.8"}]}]
            ]}
        ])),
    ]
}

#[test]
fn test_every_representation_aggregates_identically() {
    let aliases = AliasTable::cloud_defaults();
    let extractor = AddressExtractor::new(&aliases);
    let expected: AddressMap = serde_json::from_value(json!({"i-1": ["1.2.3.4", "5.6.7.8"]})).unwrap();

    let outputs: Vec<String> = scenario_payloads()
        .into_iter()
        .map(|payload| {
            let output = aggregate(&extractor, &[ResourceRecord::new("i-1", payload)]);
            assert_eq!(output, expected);
            serde_json::to_string(&output).unwrap()
        })
        .collect();

    assert!(outputs.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn test_unrecognized_payloads_are_excluded_in_every_representation() {
    let aliases = AliasTable::cloud_defaults();
    let extractor = AddressExtractor::new(&aliases);
    let ordered = doc! { "State": { "Name": "stopped" } };

    let records = vec![
        ResourceRecord::new("i-json", json!({"State": {"Name": "stopped"}})),
        ResourceRecord::new("i-binary", Payload::encode(&ordered).unwrap()),
        ResourceRecord::new("i-bson", ordered),
        ResourceRecord::new("i-pairs", json!([{"Key": "State", "Value": "stopped"}])),
    ];

    assert!(aggregate(&extractor, &records).is_empty());
}

#[test]
fn test_mixed_sources_merge_per_identifier() {
    let aliases = AliasTable::cloud_defaults();
    let extractor = AddressExtractor::new(&aliases);

    let records = vec![
        ResourceRecord::new("i-1", json!({"PUBLICIPADDRESS": "9.9.9.9"})),
        ResourceRecord::new("i-1", doc! { "public_ip_address": "1.2.3.4" }),
        ResourceRecord::new("i-1", json!([{"Key": "publicIpAddress", "Value": "1.2.3.4"}])),
    ];

    let output = aggregate(&extractor, &records);
    assert_eq!(output["i-1"], vec!["1.2.3.4", "9.9.9.9"]);
}

//! Advertising payload properties
//!
//! Payload lengths for any UUID count and name, and that the produced bytes
//! re-parse into the structures that went in.

mod common;

use ble_ranger::ble::advertising::{ad_type, parse_ad_structures, AdvState, Advertiser};
use ble_ranger::config::{MAX_ADV_UUIDS, MAX_DEVICE_NAME_LEN};
use ble_ranger::BleUuid;
use common::{MockRadio, RadioCall};
use proptest::prelude::*;

fn uuid128() -> impl Strategy<Value = BleUuid> {
    any::<u128>().prop_map(BleUuid::from_u128)
}

proptest! {
    #[test]
    fn prop_adv_payload_length(uuids in prop::collection::vec(uuid128(), 0..=MAX_ADV_UUIDS)) {
        let mut adv = Advertiser::new("PicoW").unwrap();
        for uuid in &uuids {
            adv.add_service_uuid(*uuid).unwrap();
        }
        prop_assert_eq!(adv.adv_payload().len(), 3 + 18 * uuids.len());
    }

    #[test]
    fn prop_adv_payload_reparses(uuids in prop::collection::vec(uuid128(), 0..=MAX_ADV_UUIDS)) {
        let mut adv = Advertiser::new("PicoW").unwrap();
        for uuid in &uuids {
            adv.add_service_uuid(*uuid).unwrap();
        }
        let payload = adv.adv_payload();

        let structures: Vec<_> = parse_ad_structures(&payload).collect();
        prop_assert_eq!(structures.len(), 1 + uuids.len());
        prop_assert_eq!(structures[0], (ad_type::FLAGS, &[0x06u8][..]));
        for ((kind, value), uuid) in structures[1..].iter().zip(&uuids) {
            prop_assert_eq!(*kind, ad_type::COMPLETE_128BIT_SERVICE_UUIDS);
            let bytes: [u8; 16] = (*value).try_into().unwrap();
            prop_assert_eq!(BleUuid::Uuid128(bytes), *uuid);
        }
    }

    #[test]
    fn prop_scan_response_length(name in "[a-zA-Z0-9 _-]{0,29}") {
        let adv = Advertiser::new(&name).unwrap();
        let scan = adv.scan_response();
        prop_assert_eq!(scan.len(), name.len() + 2);

        // An empty name is still one structure: a bare type byte
        let structures: Vec<_> = parse_ad_structures(&scan).collect();
        prop_assert_eq!(structures, vec![(ad_type::COMPLETE_LOCAL_NAME, name.as_bytes())]);
    }

    #[test]
    fn prop_names_over_limit_rejected(extra in 1usize..16) {
        let name = "n".repeat(MAX_DEVICE_NAME_LEN + extra);
        prop_assert!(Advertiser::new(&name).is_err());
    }
}

#[test]
fn test_mixed_uuid_sizes() {
    let mut adv = Advertiser::new("mix").unwrap();
    adv.add_service_uuid(BleUuid::Uuid16(0x1812)).unwrap();
    adv.add_service_uuid(BleUuid::from_u128(1)).unwrap();

    let payload = adv.adv_payload();
    assert_eq!(payload.len(), 3 + 4 + 18);
    let kinds: Vec<u8> = parse_ad_structures(&payload).map(|(kind, _)| kind).collect();
    assert_eq!(
        kinds,
        [
            ad_type::FLAGS,
            ad_type::COMPLETE_16BIT_SERVICE_UUIDS,
            ad_type::COMPLETE_128BIT_SERVICE_UUIDS
        ]
    );
}

#[test]
fn test_start_restart_and_stop() {
    let mut radio = MockRadio::new();
    let mut adv = Advertiser::new("PicoW").unwrap();

    adv.start(&mut radio, 160).unwrap();
    adv.start(&mut radio, 320).unwrap();
    assert_eq!(adv.state(), AdvState::Active);
    assert_eq!(radio.advertise_starts(), 2);
    assert!(matches!(
        radio.calls.last(),
        Some(RadioCall::AdvertiseStart { interval: 320, .. })
    ));

    adv.stop(&mut radio).unwrap();
    adv.stop(&mut radio).unwrap();
    assert_eq!(adv.state(), AdvState::Stopped);
    assert_eq!(radio.advertise_stops(), 1);
}

#[test]
fn test_oversized_payload_still_submitted() {
    // Four 128-bit UUIDs exceed the legacy limit; the stack gets to decide
    let mut radio = MockRadio::new();
    let mut adv = Advertiser::new("PicoW").unwrap();
    for i in 0..MAX_ADV_UUIDS as u128 {
        adv.add_service_uuid(BleUuid::from_u128(i)).unwrap();
    }

    adv.start(&mut radio, 160).unwrap();
    let (payload, _) = radio.last_advertisement().unwrap();
    assert_eq!(payload.len(), 3 + 18 * MAX_ADV_UUIDS);
}

#[cfg(test)]
mod tests {
    use crate::types::*;

    #[test]
    fn mac_parses_colon_form() {
        let mac: MacAddr = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(mac.octets(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn mac_parses_dash_form_and_mixed_case() {
        let mac: MacAddr = "AA-BB-CC-00-11-22".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:00:11:22");
    }

    #[test]
    fn mac_rejects_garbage() {
        assert!("aa:bb:cc".parse::<MacAddr>().is_err());
        assert!("zz:bb:cc:dd:ee:ff".parse::<MacAddr>().is_err());
        assert!("".parse::<MacAddr>().is_err());
    }

    #[test]
    fn mac_round_trips_through_serde() {
        let mac: MacAddr = "de:ad:be:ef:00:01".parse().unwrap();
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"de:ad:be:ef:00:01\"");
        let back: MacAddr = serde_json::from_str(&json).unwrap();
        assert_eq!(mac, back);
    }

    #[test]
    fn transient_states() {
        assert!(PowerState::Waking.is_transient());
        assert!(PowerState::Suspending.is_transient());
        assert!(PowerState::Stopping.is_transient());
        assert!(!PowerState::On.is_transient());
        assert!(!PowerState::InitFailed.is_transient());
    }

    #[test]
    fn down_states() {
        assert!(PowerState::Off.is_down());
        assert!(PowerState::Stopped.is_down());
        assert!(PowerState::Suspended.is_down());
        assert!(PowerState::Unknown.is_down());
        assert!(!PowerState::On.is_down());
        assert!(!PowerState::Waking.is_down());
    }

    #[test]
    fn vm_status_maps_to_power_state() {
        assert_eq!(VmPowerStatus::Running.as_power_state(), PowerState::On);
        assert_eq!(VmPowerStatus::Stopped.as_power_state(), PowerState::Stopped);
        assert_eq!(VmPowerStatus::Suspended.as_power_state(), PowerState::Suspended);
        assert_eq!(VmPowerStatus::Paused.as_power_state(), PowerState::Suspended);
        assert_eq!(VmPowerStatus::Unknown.as_power_state(), PowerState::Unknown);
    }

    #[test]
    fn vm_status_parses_api_strings() {
        assert_eq!(VmPowerStatus::parse("running"), VmPowerStatus::Running);
        assert_eq!(VmPowerStatus::parse("paused"), VmPowerStatus::Paused);
        assert_eq!(VmPowerStatus::parse("weird"), VmPowerStatus::Unknown);
    }

    #[test]
    fn vm_child_is_initialized_with_deterministic_id() {
        let mut parent = Node::physical("host1", "10.0.0.2");
        parent.caps.family = Some(SystemFamily::Hypervisor);
        let child = Node::vm_child(&parent, "pve1", 101, "web");

        assert_eq!(child.id.as_str(), "host1-vm-101");
        assert_eq!(child.parent, Some(NodeId::new("host1")));
        assert!(child.vm_managed);
        assert!(child.initialized);
        assert_eq!(child.vmid, Some(101));
        assert_eq!(child.kind(), NodeKind::HypervisorVm);
        assert_eq!(child.hostname, "vm-101");
    }

    #[test]
    fn discovered_service_id_is_stable() {
        let id = Service::discovered_id(&NodeId::new("srv1"), 8096);
        assert_eq!(id, "srv1-port-8096");
    }

    #[test]
    fn api_token_header() {
        let token = ApiToken {
            user: "hearth".into(),
            realm: "pam".into(),
            token_id: "monitor".into(),
            secret: "s3cret".into(),
        };
        assert_eq!(
            token.header_value(),
            "PVEAPIToken=hearth@pam!monitor=s3cret"
        );
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let mut node = Node::physical("srv1", "10.0.0.1");
        assert_eq!(node.display_name(), "srv1");
        node.name = "Workshop".into();
        assert_eq!(node.display_name(), "Workshop");
    }

    #[test]
    fn power_state_serde_is_snake_case() {
        let json = serde_json::to_string(&PowerState::InitFailed).unwrap();
        assert_eq!(json, "\"init_failed\"");
        let back: PowerState = serde_json::from_str("\"waking\"").unwrap();
        assert_eq!(back, PowerState::Waking);
    }
}

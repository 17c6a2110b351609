//! Property tests for the host-list grammar.

use arangoflow_client::config::parse_host_list;
use proptest::prelude::*;

fn host_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}"
}

proptest! {
    /// Every well-formed `h1:p1,h2:p2,...` list is accepted and parsed
    /// faithfully.
    #[test]
    fn valid_host_lists_accepted(
        hosts in proptest::collection::vec((host_name(), 1u16..=65535), 1..6)
    ) {
        let raw = hosts
            .iter()
            .map(|(h, p)| format!("{h}:{p}"))
            .collect::<Vec<_>>()
            .join(",");

        let parsed = parse_host_list(&raw).unwrap();
        prop_assert_eq!(parsed.len(), hosts.len());
        for (endpoint, (host, port)) in parsed.iter().zip(&hosts) {
            prop_assert_eq!(&endpoint.host, host);
            prop_assert_eq!(endpoint.port, *port);
        }
    }

    /// One entry without a port poisons the whole list.
    #[test]
    fn entry_missing_port_rejects_list(
        hosts in proptest::collection::vec((host_name(), 1u16..=65535), 1..4),
        bare in host_name(),
        position in 0usize..4,
    ) {
        let mut entries: Vec<String> = hosts
            .iter()
            .map(|(h, p)| format!("{h}:{p}"))
            .collect();
        entries.insert(position.min(entries.len()), bare);

        prop_assert!(parse_host_list(&entries.join(",")).is_err());
    }

    /// One entry with an extra colon poisons the whole list.
    #[test]
    fn entry_with_extra_colon_rejects_list(
        (host, port) in (host_name(), 1u16..=65535),
        extra in 0u16..100,
    ) {
        let raw = format!("{host}:{port}:{extra}");
        prop_assert!(parse_host_list(&raw).is_err());
    }
}

//! Guard properties checked through the public API only.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use url_guard::{validate, PolicyBuilder, ReasonCode, ValidationPolicy};

fn code(raw: &str, policy: &ValidationPolicy) -> Option<ReasonCode> {
    validate(raw, policy).err().map(|e| e.code())
}

#[test]
fn end_to_end_examples() {
    let policy = ValidationPolicy::default();

    assert_eq!(
        code("ftp://example.com", &policy),
        Some(ReasonCode::SchemeNotAllowed)
    );
    assert_eq!(
        code("http://169.254.169.254/latest/meta-data", &policy),
        Some(ReasonCode::PrivateNetworkBlocked)
    );
    assert_eq!(code("http://example.com", &policy), None);
}

#[test]
fn every_other_scheme_is_refused() {
    let policy = ValidationPolicy::default();
    for scheme in ["ftp", "file", "gopher", "dict", "ldap", "ws", "wss", "jar", "sftp", "tftp"] {
        let raw = format!("{}://example.com/x", scheme);
        assert_eq!(
            code(&raw, &policy),
            Some(ReasonCode::SchemeNotAllowed),
            "{}",
            raw
        );
    }
}

#[test]
fn private_ranges_are_refused_in_every_octet() {
    let policy = ValidationPolicy::default();
    for last in [0u8, 1, 17, 128, 254, 255] {
        for raw in [
            format!("http://127.0.0.{}/", last),
            format!("http://10.{}.0.1/", last),
            format!("http://172.{}.1.1/", 16 + last % 16),
            format!("http://192.168.{}.1/", last),
            format!("http://169.254.{}.1/", last),
        ] {
            assert_eq!(
                code(&raw, &policy),
                Some(ReasonCode::PrivateNetworkBlocked),
                "{}",
                raw
            );
        }
    }
}

#[test]
fn blocked_hosts_ignore_case() {
    let policy = PolicyBuilder::new().block_host("Admin-Panel").build();
    for host in ["localhost", "LOCALHOST", "LocalHost", "nginx-proxy", "Nginx-Proxy", "admin-panel", "ADMIN-PANEL"] {
        let raw = format!("http://{}/", host);
        assert_eq!(
            code(&raw, &policy),
            Some(ReasonCode::InternalHostBlocked),
            "{}",
            raw
        );
    }
}

#[test]
fn single_percent_encoding_layer_changes_nothing() {
    let policy = ValidationPolicy::default();
    let rejected = [
        "ftp://example.com/",
        "http://localhost/",
        "http://nginx-proxy/flag",
        "http://127.0.0.1/",
        "http://[::1]/",
        "http://192.168.1.10/",
        "http://0x7f000001/",
        "http://169.254.169.254/latest/meta-data",
        // inputs that carry escapes of their own
        "http://127%2E0%2E0%2E1/",
        "http://local%68ost/",
        "http://127.0.0.1%2F@example.com/",
        "http://user%40example.com@10.0.0.1/",
    ];

    for raw in rejected {
        let expected = code(raw, &policy);
        assert!(expected.is_some(), "{}", raw);

        let encoded = utf8_percent_encode(raw, NON_ALPHANUMERIC).to_string();
        assert_eq!(code(&encoded, &policy), expected, "{}", encoded);
    }
}

#[test]
fn double_encoding_never_reaches_a_target() {
    let policy = ValidationPolicy::default();
    let raw = "http://127.0.0.1/";
    let once = utf8_percent_encode(raw, NON_ALPHANUMERIC).to_string();
    let twice = utf8_percent_encode(&once, NON_ALPHANUMERIC).to_string();

    assert!(validate(&twice, &policy).is_err());
}

#[test]
fn decimal_and_hex_hosts_are_classified_structurally() {
    let policy = ValidationPolicy::default();
    // 1572395042 = 93.184.216.34
    let accepted = validate("http://1572395042/", &policy).unwrap();
    assert_eq!(accepted.url, "http://93.184.216.34/");

    assert_eq!(
        code("http://3232235777/", &policy), // 192.168.1.1
        Some(ReasonCode::PrivateNetworkBlocked)
    );
}

use super::*;

#[test]
fn tests() {
    // Positive tests
    ipn_check("ipn:1.2", 1, 2);
    ipn_check("ipn:1.0", 1, 0);
    ipn_check("ipn:977000.3", 977000, 3);
    ipn_check("ipn:18446744073709551615.1", u64::MAX, 1);

    null_check("ipn:0.0");
    null_check("dtn:none");

    dtn_check("dtn://somewhere/", "somewhere", "");
    dtn_check("dtn://somewhere/else", "somewhere", "else");
    dtn_check("dtn://somewhere/else/", "somewhere", "else/");
    dtn_check("dtn://somewhere%2Felse/", "somewhere/else", "");
    dtn_check(
        "dtn://somewhere/over/the/rainbow",
        "somewhere",
        "over/the/rainbow",
    );
    dtn_check(
        "dtn://somewhere%2Fover/the%2Frainbow",
        "somewhere/over",
        "the/rainbow",
    );
    dtn_check("dtn://somewhere//", "somewhere", "/");
    dtn_check("dtn://somewhere/~group", "somewhere", "~group");

    api_check("dtn://api:me/", "");
    api_check("dtn://api:me/echo", "echo");
    api_check("dtn://api:me/svc/inbox", "svc/inbox");

    cla_check("dtn://[tcp:10.0.0.1:4556]/", "tcp", "10.0.0.1:4556", "");
    cla_check("dtn://[ws:host.example:80]/in", "ws", "host.example:80", "in");
    cla_check("dtn://[x:a%5Db]/%20", "x", "a]b", " ");

    // Negative tests
    expect_error("");
    expect_error("dtn");
    expect_error("ipn");
    expect_error(":");
    expect_error("1dtn:none");

    expect_error("dtn:");
    expect_error("dtn:/");
    expect_error("dtn:somewhere");
    expect_error("dtn:/somewhere");
    expect_error("dtn://");
    expect_error("dtn:///else");
    expect_error("dtn://somewhere");
    expect_error("dtn://some where/");
    expect_error("dtn://[tcp]/");
    expect_error("dtn://[:addr]/");

    expect_error("ipn:");
    expect_error("ipn:1");
    expect_error("ipn:1.2.3");
    expect_error("ipn:0.1");
    expect_error("ipn:-1.2");
    expect_error("ipn:11111111111111111111111111111.222222222222222222222222222222");
    expect_error("ipn:1.222222222222222222222222222222");
}

#[test]
fn error_kinds() {
    assert!(matches!(expect_error("xyz:foo"), Error::UnknownScheme(s) if s == "xyz"));
    assert!(matches!(expect_error("no scheme"), Error::MalformedScheme(_)));
    assert!(matches!(
        expect_error("dtn://"),
        Error::MalformedSsp { scheme, .. } if scheme == "dtn"
    ));
    assert!(matches!(
        expect_error("ipn:1"),
        Error::MalformedSsp { scheme, .. } if scheme == "ipn"
    ));
}

#[test]
fn display() {
    assert_eq!(Eid::Null.to_string(), "dtn:none");
    assert_eq!(Eid::ipn(0, 0).to_string(), "dtn:none");
    assert_eq!(Eid::ipn(5, 12).to_string(), "ipn:5.12");
    assert_eq!(Eid::dtn("source", "").unwrap().to_string(), "dtn://source/");
    assert_eq!(Eid::dtn("a b", "x/y").unwrap().to_string(), "dtn://a%20b/x/y");
    assert_eq!(Eid::api("echo").to_string(), "dtn://api:me/echo");
    assert_eq!(
        Eid::cla("tcp", "127.0.0.1:4556", "rx").unwrap().to_string(),
        "dtn://[tcp:127.0.0.1:4556]/rx"
    );
}

#[test]
fn round_trip() {
    for eid in [
        Eid::Null,
        Eid::ipn(5, 12),
        Eid::ipn(1, 0),
        Eid::dtn("source", "").unwrap(),
        Eid::dtn("node.example", "svc/inbox").unwrap(),
        Eid::dtn("somewhere/else", "~all").unwrap(),
        Eid::dtn("[tcp:bad]", "x").unwrap(),
        Eid::api(""),
        Eid::api("echo"),
        Eid::cla("tcp", "10.0.0.1:4556", "").unwrap(),
        Eid::cla("ws", "host:80", "in/box").unwrap(),
        Eid::dtn("node", "a b").unwrap(),
        Eid::dtn("node", "100%").unwrap(),
        Eid::dtn("api:me", "x").unwrap(),
        Eid::dtn("n", "\u{e9}t\u{e9}\n").unwrap(),
        Eid::api("\u{e9}"),
        Eid::api("a%2Fb c"),
        Eid::cla("tcp", "a]b", "x").unwrap(),
        Eid::cla("tcp", "[::1]:4556", "in box").unwrap(),
    ] {
        let s = eid.to_string();
        let parsed: Eid = s.parse().unwrap_or_else(|e| panic!("{s}: {e}"));
        assert_eq!(parsed, eid, "{s}");
        assert_eq!(parsed.to_string(), s);
    }
}

#[test]
fn invalid_constructors() {
    assert!(Eid::dtn("", "x").is_err());
    assert!(Eid::cla("", "host", "x").is_err());
    assert!(Eid::cla("1tcp", "host", "x").is_err());
    assert!(Eid::cla("tcp:x", "host", "x").is_err());
    assert!(Eid::cla("tcp", "", "x").is_err());
}

#[test]
fn equality_follows_text() {
    let a: Eid = "dtn://node%2Dx/a".parse().unwrap();
    let b: Eid = "dtn://node-x/a".parse().unwrap();
    assert_eq!(a, b);
    assert_eq!(a.to_string(), b.to_string());

    let c = Eid::dtn("node-x", "b").unwrap();
    assert_ne!(a, c);
    assert_ne!(a.to_string(), c.to_string());
}

#[test]
fn predicates() {
    assert!(Eid::Null.is_null());
    assert!(!Eid::ipn(1, 1).is_null());

    assert!(Eid::dtn("n", "svc").unwrap().is_singleton());
    assert!(!Eid::dtn("n", "~svc").unwrap().is_singleton());
    assert!(!Eid::api("~group").is_singleton());
    assert!(Eid::ipn(1, 2).is_singleton());

    let node = Eid::dtn("n", "").unwrap();
    assert!(node.is_authoritative_over(&Eid::dtn("n", "a/b").unwrap()));
    assert!(node.is_authoritative_over(&node));
    assert!(!node.is_authoritative_over(&Eid::dtn("m", "a").unwrap()));
    assert!(Eid::dtn("n", "a").unwrap().is_authoritative_over(&Eid::dtn("n", "a/b").unwrap()));
    assert!(!Eid::dtn("n", "a").unwrap().is_authoritative_over(&Eid::dtn("n", "ab").unwrap()));
    assert!(!Eid::dtn("n", "a/b").unwrap().is_authoritative_over(&Eid::dtn("n", "a").unwrap()));

    assert!(Eid::ipn(3, 0).is_authoritative_over(&Eid::ipn(3, 7)));
    assert!(!Eid::ipn(3, 1).is_authoritative_over(&Eid::ipn(3, 7)));
    assert!(!Eid::ipn(3, 0).is_authoritative_over(&Eid::ipn(4, 0)));

    assert!(!Eid::Null.is_authoritative_over(&Eid::Null));
    assert!(!Eid::ipn(3, 0).is_authoritative_over(&Eid::dtn("3", "").unwrap()));

    assert_eq!(Eid::dtn("n", "a/b").unwrap().node_id(), Eid::dtn("n", "").unwrap());
    assert_eq!(Eid::ipn(9, 4).node_id(), Eid::ipn(9, 0));
}

fn expect_error(s: &str) -> Error {
    s.parse::<Eid>()
        .expect_err(&format!("\"{s}\" Parsed successfully!"))
}

fn null_check(s: &str) {
    assert!(
        s.parse::<Eid>()
            .unwrap_or_else(|_| panic!("Failed to parse \"{s}\""))
            .is_null()
    );
}

fn ipn_check(s: &str, expected_node: u64, expected_service: u64) {
    let Eid::Ipn { node, service } = s.parse().expect("Failed to parse") else {
        panic!("Not an ipn EID!")
    };
    assert_eq!(expected_node, node);
    assert_eq!(expected_service, service);
}

fn dtn_check(s: &str, expected_node_name: &str, expected_demux: &str) {
    let Eid::Dtn { node_name, demux } = s.parse().expect("Failed to parse") else {
        panic!("Not a dtn EID!")
    };
    assert_eq!(node_name.as_ref(), expected_node_name);
    assert_eq!(demux.as_ref(), expected_demux);
}

fn api_check(s: &str, expected_path: &str) {
    let Eid::Api { path } = s.parse().expect("Failed to parse") else {
        panic!("Not an api EID!")
    };
    assert_eq!(path.as_ref(), expected_path);
}

fn cla_check(s: &str, expected_scheme: &str, expected_specific: &str, expected_demux: &str) {
    let Eid::Cla {
        scheme,
        specific,
        demux,
    } = s.parse().expect("Failed to parse")
    else {
        panic!("Not a CLA EID!")
    };
    assert_eq!(scheme.as_ref(), expected_scheme);
    assert_eq!(specific.as_ref(), expected_specific);
    assert_eq!(demux.as_ref(), expected_demux);
}

use pretty_assertions::assert_eq;
use url::Url;
use vidspire_engine::{decode_packet, Packet, PushError, PushEvent, WsConnector};

#[test]
fn endpoint_targets_the_socket_io_path_with_the_job_id() {
    let socket_url = Url::parse("https://push.example.com/api?x=1").unwrap();
    let connector = WsConnector::new(socket_url).unwrap();

    assert_eq!(
        connector.endpoint("J 1").as_str(),
        "wss://push.example.com/socket.io/?EIO=4&transport=websocket&jobId=J+1"
    );
}

#[test]
fn unsupported_scheme_is_rejected() {
    let err = WsConnector::new(Url::parse("ftp://push.example.com").unwrap()).unwrap_err();

    assert_eq!(err, PushError::InvalidUrl("unsupported scheme `ftp`".to_string()));
}

#[test]
fn engine_io_control_packets() {
    assert_eq!(
        decode_packet(r#"0{"sid":"a","pingInterval":25000,"pingTimeout":20000}"#),
        Packet::Open
    );
    assert_eq!(decode_packet("2"), Packet::Ping);
    assert_eq!(decode_packet("3"), Packet::Ignored);
    assert_eq!(decode_packet("6"), Packet::Ignored);
    assert_eq!(decode_packet("1"), Packet::Closed);
    assert_eq!(decode_packet("41"), Packet::Closed);
    assert_eq!(decode_packet(r#"40{"sid":"b"}"#), Packet::Connected);
}

#[test]
fn connect_error_carries_the_server_message() {
    assert_eq!(
        decode_packet(r#"44{"message":"Unknown job"}"#),
        Packet::ConnectError("Unknown job".to_string())
    );
}

#[test]
fn event_packets_decode_into_push_events() {
    assert_eq!(
        decode_packet(r#"42["progress",{"jobId":"J1","percentage":30,"message":"Fetching"}]"#),
        Packet::Event(PushEvent::Progress {
            job_id: Some("J1".to_string()),
            percentage: 30.0,
            message: "Fetching".to_string(),
            stage: None,
        })
    );
    assert_eq!(
        decode_packet(r#"4212["error",{"error":"Comments disabled"}]"#),
        Packet::Event(PushEvent::Error {
            job_id: None,
            error: "Comments disabled".to_string(),
        })
    );
}

#[test]
fn unknown_events_are_ignored() {
    assert_eq!(decode_packet(r#"42["heartbeat",{}]"#), Packet::Ignored);
    assert_eq!(decode_packet(r#"42["progress"]"#), Packet::Ignored);
}

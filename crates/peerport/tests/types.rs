//! Wire shapes of commands and events

use peerport::{Command, Event};
use serde_json::json;

#[test]
fn test_new_peer_id_is_optional() {
    let cmd: Command = serde_json::from_value(json!({"type": "NewPeer"})).unwrap();
    assert_eq!(cmd, Command::NewPeer { peer_id: None });

    let cmd: Command = serde_json::from_value(json!({"type": "NewPeer", "peerID": "abc"})).unwrap();
    assert_eq!(
        cmd,
        Command::NewPeer {
            peer_id: Some("abc".into())
        }
    );

    // omitted again when serialized
    let json = serde_json::to_value(Command::NewPeer { peer_id: None }).unwrap();
    assert_eq!(json, json!({"type": "NewPeer"}));
}

#[test]
fn test_command_field_names() {
    let cases = vec![
        (
            json!({"type": "ConnectToPeer", "local": "abc", "remote": "xyz"}),
            Command::ConnectToPeer {
                local: "abc".into(),
                remote: "xyz".into(),
            },
        ),
        (
            json!({"type": "CallPeer", "local": "abc", "remote": "xyz", "streamID": "s1"}),
            Command::CallPeer {
                local: "abc".into(),
                remote: "xyz".into(),
                stream_id: "s1".into(),
            },
        ),
        (
            json!({"type": "ReconnectToServer", "peerID": "abc"}),
            Command::ReconnectToServer {
                peer_id: "abc".into(),
            },
        ),
        (
            json!({"type": "AnswerMediaConnection", "mediaConnectionID": "m1"}),
            Command::AnswerMediaConnection {
                media_connection_id: "m1".into(),
                stream_id: None,
            },
        ),
        (
            json!({"type": "AnswerMediaConnection", "mediaConnectionID": "m1", "streamID": "s1"}),
            Command::AnswerMediaConnection {
                media_connection_id: "m1".into(),
                stream_id: Some("s1".into()),
            },
        ),
        (
            json!({"type": "SendData", "dataID": "d1", "data": {"a": [1, 2]}}),
            Command::SendData {
                data_id: "d1".into(),
                data: json!({"a": [1, 2]}),
            },
        ),
        (
            json!({"type": "SendBlob", "dataID": "d1", "blobID": "b1"}),
            Command::SendBlob {
                data_id: "d1".into(),
                blob_id: "b1".into(),
            },
        ),
        (
            json!({"type": "OpenLocalStream", "video": true}),
            Command::OpenLocalStream {
                audio: false,
                video: true,
            },
        ),
        (
            json!({"type": "CloseMediaConnection", "mediaConnectionID": "m1"}),
            Command::CloseMediaConnection {
                media_connection_id: "m1".into(),
            },
        ),
    ];
    for (json, expected) in cases {
        let parsed: Command = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(parsed, expected, "{}", json);
    }
}

#[test]
fn test_unknown_command_tag_is_rejected() {
    assert!(serde_json::from_value::<Command>(json!({"type": "Shutdown"})).is_err());
    assert!(serde_json::from_value::<Command>(json!({"local": "abc"})).is_err());
}

#[test]
fn test_event_field_names() {
    let cases = vec![
        (
            Event::PeerError {
                peer_id: "abc".into(),
                err: "boom".into(),
            },
            json!({"type": "PeerError", "peerID": "abc", "err": "boom"}),
        ),
        (
            Event::DataReceivedJson {
                data_id: "d1".into(),
                local: "abc".into(),
                remote: "xyz".into(),
                data: json!("hello"),
            },
            json!({
                "type": "DataReceivedJSON",
                "dataID": "d1",
                "local": "abc",
                "remote": "xyz",
                "data": "hello"
            }),
        ),
        (
            Event::DataReceivedBlob {
                data_id: "d1".into(),
                blob_id: "b1".into(),
                local: "abc".into(),
                remote: "xyz".into(),
                content_type: "image/png".into(),
            },
            json!({
                "type": "DataReceivedBlob",
                "dataID": "d1",
                "blobID": "b1",
                "local": "abc",
                "remote": "xyz",
                "contentType": "image/png"
            }),
        ),
        (
            Event::MediaStreamReceived {
                media_connection_id: "m1".into(),
                stream_id: "s1".into(),
                local: "abc".into(),
                remote: "xyz".into(),
            },
            json!({
                "type": "MediaStreamReceived",
                "mediaConnectionID": "m1",
                "streamID": "s1",
                "local": "abc",
                "remote": "xyz"
            }),
        ),
        (
            Event::MediaConnectionDoesNotExist {
                media_connection_id: "m1".into(),
            },
            json!({"type": "MediaConnectionDoesNotExist", "mediaConnectionID": "m1"}),
        ),
        (
            Event::StreamDoesNotExist {
                stream_id: "s1".into(),
            },
            json!({"type": "StreamDoesNotExist", "streamID": "s1"}),
        ),
        (
            Event::BlobRead {
                blob_id: "b1".into(),
                content_type: "Binary".into(),
                data: "AQID".into(),
            },
            json!({"type": "BlobRead", "blobID": "b1", "contentType": "Binary", "data": "AQID"}),
        ),
        (
            Event::UnknownCommand {
                reason: "bad".into(),
            },
            json!({"type": "UnknownCommand", "reason": "bad"}),
        ),
    ];
    for (event, expected) in cases {
        assert_eq!(serde_json::to_value(&event).unwrap(), expected);
        assert_eq!(event.tag(), expected["type"]);
    }
}

//! Drives a real `ThreadHost` over loopback sockets, playing both the
//! headset client and the supervisor, covering the literal scenarios of the
//! session/transport contract this crate implements.

use std::{
    io::{BufRead, BufReader, Write},
    net::{Ipv4Addr, SocketAddrV4, TcpStream, UdpSocket},
    thread,
    time::Duration,
};

use vr_session_core::{
    config::SessionConfig,
    protocol::{StreamControlMessage, TAG_CONNECTION_ACK, TAG_HELLO, TAG_STREAM_CONTROL, TAG_TIME_SYNC},
    NoopCallbacks, ThreadHost,
};

/// Ports are distinct per test so the suite can run concurrently without
/// colliding on a loopback bind.
fn config(udp_port: u16, control_port: u16) -> SessionConfig {
    SessionConfig::new(Ipv4Addr::LOCALHOST, udp_port, Ipv4Addr::LOCALHOST, control_port)
}

fn client_socket(server_port: u16) -> (UdpSocket, u16) {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    socket.connect((Ipv4Addr::LOCALHOST, server_port)).unwrap();
    let port = socket.local_addr().unwrap().port();
    (socket, port)
}

fn supervisor(control_port: u16) -> BufReader<TcpStream> {
    // The worker thread's accept() is non-blocking and polled, not instant.
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect((Ipv4Addr::LOCALHOST, control_port)) {
            return BufReader::new(stream);
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("control channel never accepted a connection");
}

fn send_command(reader: &mut BufReader<TcpStream>, line: &str) -> String {
    reader.get_mut().write_all(format!("{line}\n").as_bytes()).unwrap();
    let mut response = String::new();
    reader.read_line(&mut response).unwrap();
    response
}

fn hello_datagram(name: &[u8]) -> Vec<u8> {
    let mut buf = TAG_HELLO.to_le_bytes().to_vec();
    let mut device_name = [0u8; 32];
    let n = name.len().min(32);
    device_name[..n].copy_from_slice(&name[..n]);
    buf.extend_from_slice(&device_name);
    buf
}

#[test]
fn hello_then_get_requests_lists_the_sanitized_device() {
    let mut host = ThreadHost::new();
    host.start(config(29944, 29945), std::sync::Arc::new(NoopCallbacks)).unwrap();

    let (client, client_port) = client_socket(29944);
    client.send(&hello_datagram(b"Test Device 1")).unwrap();

    let mut supervisor = supervisor(29945);
    let response = send_command(&mut supervisor, "GetRequests");
    assert_eq!(response, format!("127.0.0.1:{client_port} Test_Device_1\n"));

    host.stop();
}

#[test]
fn connect_replies_success_and_sends_connection_ack() {
    let mut host = ThreadHost::new();
    host.start(config(29946, 29947), std::sync::Arc::new(NoopCallbacks)).unwrap();

    let (client, client_port) = client_socket(29946);
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let mut supervisor = supervisor(29947);
    let response = send_command(&mut supervisor, &format!("Connect 127.0.0.1:{client_port}"));
    assert_eq!(response, "Success\n");

    let mut buf = [0u8; 16];
    let len = client.recv(&mut buf).expect("expected a ConnectionAck datagram");
    assert_eq!(len, 4);
    assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), TAG_CONNECTION_ACK);

    host.stop();
}

#[test]
fn video_frame_fragments_only_once_streaming_is_enabled() {
    let mut host = ThreadHost::new();
    host.start(config(29948, 29949), std::sync::Arc::new(NoopCallbacks)).unwrap();

    let (client, client_port) = client_socket(29948);
    client.set_read_timeout(Some(Duration::from_millis(300))).unwrap();

    let mut supervisor = supervisor(29949);
    send_command(&mut supervisor, &format!("Connect 127.0.0.1:{client_port}"));
    let mut ack = [0u8; 16];
    client.recv(&mut ack).unwrap();

    let producer = host.video_producer();
    producer.send_video_frame(&[0xAB; 10], 1, 1);
    let mut buf = [0u8; 64];
    assert!(client.recv(&mut buf).is_err(), "no datagram before StreamControl start");

    let mut start = TAG_STREAM_CONTROL.to_le_bytes().to_vec();
    start.extend_from_slice(&StreamControlMessage::START.to_le_bytes());
    client.send(&start).unwrap();
    thread::sleep(Duration::from_millis(50));

    let data: Vec<u8> = (0..2500u32).map(|i| (i % 256) as u8).collect();
    producer.send_video_frame(&data, 1_000_000, 42);

    let mut sizes = Vec::new();
    for _ in 0..3 {
        let mut buf = [0u8; 1100];
        let len = client.recv(&mut buf).expect("expected a video fragment");
        sizes.push(len);
    }
    assert_eq!(sizes, vec![1024, 1008, 512]);

    host.stop();
}

#[test]
fn time_sync_mode_zero_is_reflected_with_mode_one() {
    let mut host = ThreadHost::new();
    host.start(config(29950, 29951), std::sync::Arc::new(NoopCallbacks)).unwrap();

    let (client, client_port) = client_socket(29950);
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let mut supervisor = supervisor(29951);
    send_command(&mut supervisor, &format!("Connect 127.0.0.1:{client_port}"));
    let mut ack = [0u8; 16];
    client.recv(&mut ack).unwrap();

    let mut request = TAG_TIME_SYNC.to_le_bytes().to_vec();
    request.extend_from_slice(&0u32.to_le_bytes()); // mode 0
    request.extend_from_slice(&7u32.to_le_bytes()); // sequence
    request.extend_from_slice(&0u64.to_le_bytes()); // serverTime
    request.extend_from_slice(&123u64.to_le_bytes()); // clientTime
    request.extend_from_slice(&[0u8; 8]);
    client.send(&request).unwrap();

    let mut buf = [0u8; 64];
    client.recv(&mut buf).expect("expected a time-sync reflection");
    assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), TAG_TIME_SYNC);
    assert_eq!(u32::from_le_bytes(buf[4..8].try_into().unwrap()), 1);
    assert_eq!(u32::from_le_bytes(buf[8..12].try_into().unwrap()), 7);
    assert_eq!(u64::from_le_bytes(buf[20..28].try_into().unwrap()), 123);

    host.stop();
}

#[test]
fn enable_test_mode_succeeds_and_notifies_connected_client() {
    let mut host = ThreadHost::new();
    host.start(config(29952, 29953), std::sync::Arc::new(NoopCallbacks)).unwrap();

    let mut supervisor = supervisor(29953);
    let response = send_command(&mut supervisor, "EnableTestMode 1");
    assert_eq!(response, "Success\n", "no client connected yet, still succeeds");

    let (client, client_port) = client_socket(29952);
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    send_command(&mut supervisor, &format!("Connect 127.0.0.1:{client_port}"));
    let mut ack = [0u8; 16];
    client.recv(&mut ack).unwrap();

    let response = send_command(&mut supervisor, "EnableTestMode 1");
    assert_eq!(response, "Success\n");

    let mut buf = [0u8; 16];
    let len = client.recv(&mut buf).expect("expected a ChangeSettings datagram");
    assert_eq!(len, 12);
    assert_eq!(i32::from_le_bytes(buf[4..8].try_into().unwrap()), 1);

    host.stop();
}

#[test]
fn unknown_command_is_forwarded_to_the_host_callback() {
    struct Echo;
    impl vr_session_core::SessionCallbacks for Echo {
        fn on_unknown_command(&self, name: &str, args: &str) -> String {
            format!("{name}:{args}\n")
        }
        fn on_pose_updated(&self) {}
    }

    let mut host = ThreadHost::new();
    host.start(config(29954, 29955), std::sync::Arc::new(Echo)).unwrap();

    let mut supervisor = supervisor(29955);
    let response = send_command(&mut supervisor, "CustomThing payload");
    assert_eq!(response, "CustomThing:payload\n");

    host.stop();
}

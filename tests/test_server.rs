use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use pmu_cli::pmu_server::{PmuServer, ServerConfig, ServerError, ServerEvent};
use pmu_core::acquisition::{SampleProducer, SyntheticSource};
use pmu_core::context::PmuContext;
use pmu_core::details::PmuDetails;
use pmu_core::ieee_c37_118::commands::{CommandFrame, CommandType};
use pmu_core::ieee_c37_118::common::FrameType;
use pmu_core::ieee_c37_118::config::GlobalConfig;
use pmu_core::ieee_c37_118::data_frame::DataCodec;
use pmu_core::ieee_c37_118::header;
use pmu_core::ieee_c37_118::utils::validate_checksum;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

const REPLY: Duration = Duration::from_secs(3);
const SILENCE: Duration = Duration::from_millis(300);

fn loopback(port: u16) -> ServerConfig {
    ServerConfig::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

async fn start_server(config: ServerConfig) -> (PmuServer, SocketAddr) {
    let context = PmuContext::new(PmuDetails::default()).unwrap();
    let server = PmuServer::new(config, context);
    let addr = server.start().await.unwrap();
    (server, addr)
}

fn command(command: CommandType) -> Vec<u8> {
    CommandFrame::new(1, command, None).to_hex().unwrap()
}

async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut frame = vec![0u8; 4];
    timeout(REPLY, stream.read_exact(&mut frame))
        .await
        .expect("no reply")
        .unwrap();
    let size = u16::from_be_bytes([frame[2], frame[3]]) as usize;
    frame.resize(size, 0);
    timeout(REPLY, stream.read_exact(&mut frame[4..]))
        .await
        .expect("truncated reply")
        .unwrap();
    frame
}

async fn expect_silence(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    let result = timeout(SILENCE, stream.read(&mut buf)).await;
    assert!(result.is_err(), "unexpected reply: {:?}", result);
}

async fn wait_for(events: &mut broadcast::Receiver<ServerEvent>, wanted: ServerEvent) {
    timeout(REPLY, async {
        loop {
            if events.recv().await.unwrap() == wanted {
                break;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {:?} event", wanted));
}

async fn assert_config_exchange(stream: &mut TcpStream, kind: CommandType) {
    stream.write_all(&command(kind)).await.unwrap();
    let frame = read_frame(stream).await;
    let expected_type = if kind == CommandType::SendConfigFrame1 { 0x21 } else { 0x31 };
    assert_eq!(&frame[0..2], &[0xAA, expected_type]);
    assert_eq!(u16::from_be_bytes([frame[2], frame[3]]) as usize, frame.len());
    assert!(validate_checksum(&frame).is_ok());
}

#[tokio::test]
async fn test_config1_exchange() {
    let (server, addr) = start_server(loopback(0)).await;
    let mut events = server.subscribe();
    let mut stream = TcpStream::connect(addr).await.unwrap();

    assert_config_exchange(&mut stream, CommandType::SendConfigFrame1).await;
    wait_for(&mut events, ServerEvent::ConfigRequested(FrameType::Config1)).await;

    stream
        .write_all(&command(CommandType::SendConfigFrame2))
        .await
        .unwrap();
    let frame = read_frame(&mut stream).await;
    let config = GlobalConfig::from_raw_data(&frame).unwrap();
    assert_eq!(config.id_code(), 1);
    assert_eq!(config.num_pmu(), 1);
    assert_eq!(config.pmu(1).unwrap().station_name_str(), "PMU Station");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_short_frame_with_bad_crc_is_dropped() {
    let (server, addr) = start_server(loopback(0)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // FRAMESIZE 8 is below the smallest command frame; its trailing 4 bytes are then
    // rejected as a header of their own
    stream
        .write_all(&[0xAA, 0x41, 0x00, 0x08, 0x00, 0x01, 0xDE, 0xAD])
        .await
        .unwrap();
    expect_silence(&mut stream).await;

    assert_config_exchange(&mut stream, CommandType::SendConfigFrame1).await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_corrupted_crc_is_dropped() {
    let (server, addr) = start_server(loopback(0)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut frame = command(CommandType::SendConfigFrame2);
    let last = frame.len() - 1;
    frame[last] ^= 0x01;
    stream.write_all(&frame).await.unwrap();
    expect_silence(&mut stream).await;

    assert_config_exchange(&mut stream, CommandType::SendConfigFrame2).await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_body_timeout_then_fresh_exchange() {
    let config = loopback(0).with_body_timeout(Duration::from_millis(200));
    let (server, addr) = start_server(config).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(&[0xAA, 0x41, 0x00, 0x12]).await.unwrap();
    sleep(Duration::from_millis(500)).await;

    assert_config_exchange(&mut stream, CommandType::SendConfigFrame1).await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_ignored_frames_get_no_reply() {
    let (server, addr) = start_server(loopback(0)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Header of a CFG-2 frame instead of a command
    stream.write_all(&[0xAA, 0x31, 0x00, 0x12]).await.unwrap();
    expect_silence(&mut stream).await;

    for code in [0x0000, 0x0007, 0x0F34] {
        stream
            .write_all(&command(CommandType::classify(code)))
            .await
            .unwrap();
    }
    stream
        .write_all(&command(CommandType::SendConfigFrame3))
        .await
        .unwrap();
    expect_silence(&mut stream).await;

    assert_config_exchange(&mut stream, CommandType::SendConfigFrame2).await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_header_response() {
    let (server, addr) = start_server(loopback(0)).await;
    let mut events = server.subscribe();
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(&command(CommandType::SendHeaderFrame))
        .await
        .unwrap();
    let frame = read_frame(&mut stream).await;
    assert_eq!(&frame[0..2], &[0xAA, 0x11]);
    assert_eq!(header::parse_text(&frame).unwrap(), "PMU Station PMU 1");
    wait_for(&mut events, ServerEvent::HeaderRequested).await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_data_on_streams_frames() {
    let (server, addr) = start_server(loopback(0)).await;
    let context = server.context().clone();
    let mut events = server.subscribe();
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(&command(CommandType::TurnOnTransmission))
        .await
        .unwrap();
    wait_for(&mut events, ServerEvent::DataOn).await;

    let config = context.config.read().clone();
    let mut source = SyntheticSource::seeded(&config, 11).unwrap();
    let feeder = tokio::spawn(async move {
        for _ in 0..20 {
            context.samples.push(source.next_sample().unwrap());
            sleep(Duration::from_millis(20)).await;
        }
    });

    let mut codec = DataCodec::bind(&config).unwrap();
    for _ in 0..3 {
        let frame = read_frame(&mut stream).await;
        assert_eq!(&frame[0..2], &[0xAA, 0x01]);
        assert_eq!(frame.len(), codec.frame_size());
        assert!(validate_checksum(&frame).is_ok());
        assert_eq!(codec.decode(&frame, true), Ok(frame.len()));
        assert_eq!(codec.id_code, 1);
        assert_eq!(codec.stat(1), Ok(0));
    }

    stream
        .write_all(&command(CommandType::TurnOffTransmission))
        .await
        .unwrap();
    wait_for(&mut events, ServerEvent::DataOff).await;

    feeder.await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_events() {
    let context = PmuContext::new(PmuDetails::default()).unwrap();
    let server = PmuServer::new(loopback(0), context);
    let mut events = server.subscribe();

    let addr = server.start().await.unwrap();
    wait_for(&mut events, ServerEvent::Started(addr)).await;
    assert_eq!(server.start().await.unwrap(), addr);
    assert_eq!(server.local_addr().await, Some(addr));

    let conflicting = PmuServer::new(
        loopback(addr.port()),
        PmuContext::new(PmuDetails::default()).unwrap(),
    );
    let mut conflict_events = conflicting.subscribe();
    assert!(matches!(
        conflicting.start().await,
        Err(ServerError::Bind { .. })
    ));
    let failure = timeout(REPLY, conflict_events.recv()).await.unwrap().unwrap();
    assert!(matches!(failure, ServerEvent::Failed(_)));

    server.stop().await.unwrap();
    wait_for(&mut events, ServerEvent::Stopped).await;
    assert!(!server.is_running().await);
    assert!(matches!(server.stop().await, Err(ServerError::AlreadyStopped)));
    assert!(TcpStream::connect(addr).await.is_err());
}

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing_subscriber::EnvFilter;

use pmu_cli::pmu_server::{PmuServer, ServerConfig, ServerEvent};
use pmu_core::acquisition::{spawn_producer, SyntheticSource};
use pmu_core::context::PmuContext;
use pmu_core::details::PmuDetails;
use pmu_core::ieee_c37_118::commands::{CommandFrame, CommandType};
use pmu_core::ieee_c37_118::common::{FrameType, PrefixFrame};
use pmu_core::ieee_c37_118::config::GlobalConfig;
use pmu_core::ieee_c37_118::data_frame::DataCodec;
use pmu_core::ieee_c37_118::header;
use pmu_core::ieee_c37_118::utils::timestamp_nanos;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "pmu")]
#[command(about = "IEEE C37.118 Phasor Measurement Unit", long_about = None)]
struct Cli {
    /// Log through env_logger instead of tracing.
    #[arg(long, global = true)]
    plain_log: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the protocol server.
    Serve {
        #[arg(long)]
        ip: Option<IpAddr>,
        #[arg(long)]
        port: Option<u16>,
        /// JSON file with the device details.
        #[arg(long)]
        details: Option<PathBuf>,
        /// Feed synthetic samples at this rate (Hz).
        #[arg(long)]
        simulate: Option<f64>,
    },
    /// Send one command to a PMU and summarise the reply.
    #[command(arg_required_else_help = true)]
    Request {
        ip: IpAddr,
        port: u16,
        command: RequestKind,
        #[arg(long, default_value_t = 1)]
        id_code: u16,
        /// Data frames to read after `on`.
        #[arg(long, default_value_t = 5)]
        frames: usize,
    },
    /// Print a frame of the stock configuration as hex.
    #[command(arg_required_else_help = true)]
    Dump {
        frame: DumpKind,
        #[arg(long)]
        details: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RequestKind {
    On,
    Off,
    Header,
    Config1,
    Config2,
    Config3,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DumpKind {
    Config1,
    Config2,
    Header,
}

fn init_logging(plain: bool) {
    if plain {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn other<E: std::fmt::Display>(e: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

fn load_details(path: Option<&PathBuf>) -> io::Result<PmuDetails> {
    let mut details = match path {
        Some(path) => PmuDetails::load_or_default(path).map_err(other)?,
        None => PmuDetails::default(),
    };
    details.apply_env().map_err(other)?;
    Ok(details)
}

/// Converts a simulation rate in Hz to the producer's sample period.
fn simulation_period(hz: f64) -> io::Result<Duration> {
    match Duration::try_from_secs_f64(1.0 / hz) {
        Ok(period) if !period.is_zero() => Ok(period),
        Ok(_) => Err(other(format!("simulation rate {} Hz is too high", hz))),
        Err(e) => Err(other(format!("invalid simulation rate {} Hz: {}", hz, e))),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = Cli::parse();
    init_logging(args.plain_log);

    match args.command {
        Commands::Serve {
            ip,
            port,
            details,
            simulate,
        } => serve(ip, port, details, simulate).await,
        Commands::Request {
            ip,
            port,
            command,
            id_code,
            frames,
        } => request(ip, port, command, id_code, frames).await,
        Commands::Dump { frame, details } => {
            let details = load_details(details.as_ref())?;
            let context = PmuContext::new(details).map_err(other)?;
            let bytes = match frame {
                DumpKind::Config1 => context.config_frame(FrameType::Config1),
                DumpKind::Config2 => context.config_frame(FrameType::Config2),
                DumpKind::Header => context.header_frame(),
            }
            .map_err(other)?;
            println!("{}", to_hex(&bytes));
            Ok(())
        }
    }
}

async fn serve(
    ip: Option<IpAddr>,
    port: Option<u16>,
    details_path: Option<PathBuf>,
    simulate: Option<f64>,
) -> io::Result<()> {
    let mut details = load_details(details_path.as_ref())?;
    if details.first_run {
        if let Some(path) = details_path.as_ref() {
            info!("First run, saving details to {}", path.display());
            details.save(path).map_err(other)?;
        }
    }

    let mut server_config = ServerConfig::from_env().map_err(other)?;
    server_config.port = port.unwrap_or(details.port);
    if let Some(ip) = ip {
        server_config.bind_ip = ip;
    }

    let context = PmuContext::new(details).map_err(other)?;
    let server = Arc::new(PmuServer::new(server_config, context.clone()));

    let mut events = server.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ServerEvent::Failed(reason) => tracing::error!(%reason, "server failure"),
                event => tracing::info!(?event, "server event"),
            }
        }
    });

    let _producer = match simulate {
        Some(hz) if hz > 0.0 => {
            let source = SyntheticSource::new(&context.config.read()).map_err(other)?;
            Some(spawn_producer(
                context.samples.clone(),
                source,
                simulation_period(hz)?,
            )?)
        }
        Some(hz) => {
            warn!("Ignoring non-positive simulation rate {}", hz);
            None
        }
        None => None,
    };

    server.start().await.map_err(other)?;
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    server.stop().await.map_err(other)?;
    Ok(())
}

async fn read_frame(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut frame = vec![0u8; 4];
    time::timeout(REPLY_TIMEOUT, stream.read_exact(&mut frame))
        .await
        .map_err(other)??;
    let size = u16::from_be_bytes([frame[2], frame[3]]) as usize;
    if size < 4 {
        return Err(other(format!("FRAMESIZE {} is too small", size)));
    }
    frame.resize(size, 0);
    time::timeout(REPLY_TIMEOUT, stream.read_exact(&mut frame[4..]))
        .await
        .map_err(other)??;
    Ok(frame)
}

async fn send_command(stream: &mut TcpStream, id_code: u16, command: CommandType) -> io::Result<()> {
    let frame = CommandFrame::new(id_code, command, None).to_hex().map_err(other)?;
    stream.write_all(&frame).await
}

fn print_config(config: &GlobalConfig) {
    println!(
        "IDCODE {} time base {} data rate {} PMUs {}",
        config.id_code(),
        config.time_base(),
        config.data_rate().0,
        config.num_pmu()
    );
    for pmu in config.pmus() {
        println!(
            "  {} id {}: {} phasors, {} analogs, {} status words, {}",
            pmu.station_name_str(),
            pmu.id_code(),
            pmu.num_phasors(),
            pmu.num_analogs(),
            pmu.num_status_words(),
            pmu.nominal_freq()
        );
    }
}

async fn request(
    ip: IpAddr,
    port: u16,
    kind: RequestKind,
    id_code: u16,
    frames: usize,
) -> io::Result<()> {
    let mut stream = TcpStream::connect((ip, port)).await?;
    info!("Connected to {}:{}", ip, port);

    match kind {
        RequestKind::Off => send_command(&mut stream, id_code, CommandType::TurnOffTransmission).await?,
        RequestKind::Config3 => {
            send_command(&mut stream, id_code, CommandType::SendConfigFrame3).await?;
            println!("CFG-3 requested; this device sends no reply");
        }
        RequestKind::Header => {
            send_command(&mut stream, id_code, CommandType::SendHeaderFrame).await?;
            let frame = read_frame(&mut stream).await?;
            println!("{}", header::parse_text(&frame).map_err(other)?);
        }
        RequestKind::Config1 | RequestKind::Config2 => {
            let command = if matches!(kind, RequestKind::Config1) {
                CommandType::SendConfigFrame1
            } else {
                CommandType::SendConfigFrame2
            };
            send_command(&mut stream, id_code, command).await?;
            let frame = read_frame(&mut stream).await?;
            let config = GlobalConfig::from_raw_data(&frame).map_err(other)?;
            print_config(&config);
        }
        RequestKind::On => {
            send_command(&mut stream, id_code, CommandType::SendConfigFrame2).await?;
            let config = GlobalConfig::from_raw_data(&read_frame(&mut stream).await?).map_err(other)?;
            print_config(&config);
            let mut codec = DataCodec::bind(&config).map_err(other)?;

            send_command(&mut stream, id_code, CommandType::TurnOnTransmission).await?;
            for _ in 0..frames {
                let frame = read_frame(&mut stream).await?;
                let prefix = PrefixFrame::from_hex(&frame).map_err(other)?;
                if prefix.frame_type().ok() != Some(FrameType::Data) {
                    continue;
                }
                codec.decode(&frame, true).map_err(other)?;
                let nanos = timestamp_nanos(codec.epoch_seconds, codec.frac_of_second, codec.time_base);
                for (index, sample) in codec.samples().iter().enumerate() {
                    println!(
                        "{} PMU {} STAT {:04X} phasors {:?} freq {:?}",
                        nanos,
                        index + 1,
                        sample.stat,
                        sample.phasors(),
                        codec.freq_deviation(index + 1).map_err(other)?
                    );
                }
            }
            send_command(&mut stream, id_code, CommandType::TurnOffTransmission).await?;
        }
    }
    Ok(())
}

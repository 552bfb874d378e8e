use clap::{Arg, ArgAction, Command, value_parser};
use log::{error, info};
use mediasync::audio::{AudioOutput, NullAudioOutput};
use mediasync::config::{app_name, version};
use mediasync::decoder::DecodeBoundary;
use mediasync::decoder::synthetic::{SyntheticSource, SyntheticSpec};
use mediasync::{PlayerConfig, VideoPlayer};
use mediasync::pipeline::PlayState;
use std::process;
use std::time::{Duration, Instant};

fn main() {
    tracing_subscriber::fmt::init();

    let mut command = Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON file overriding player settings.")
                .required(false),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration-secs")
                .value_name("SECONDS")
                .help("Length of the generated test clip.")
                .value_parser(value_parser!(u64))
                .default_value("5"),
        )
        .arg(
            Arg::new("fps")
                .long("fps")
                .value_name("FPS")
                .help("Frame rate of the generated test clip.")
                .value_parser(value_parser!(u32))
                .default_value("30"),
        )
        .arg(
            Arg::new("tick-hz")
                .long("tick-hz")
                .value_name("HZ")
                .help("Rate at which the player is ticked, like a render loop.")
                .value_parser(value_parser!(u32))
                .default_value("60"),
        );

    if cfg!(feature = "ffmpeg") {
        command = command.arg(
            Arg::new("input")
                .value_name("INPUT")
                .help("Media file to play instead of the test clip.")
                .required(false),
        );
    }
    if cfg!(feature = "cpal") {
        command = command.arg(
            Arg::new("device")
                .long("device")
                .help("Play audio on the default output device.")
                .action(ArgAction::SetTrue),
        );
    }

    let matches = command.get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => match PlayerConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{:#}", e);
                process::exit(2);
            }
        },
        None => PlayerConfig::default(),
    };

    let duration = Duration::from_secs(*matches.get_one::<u64>("duration").unwrap_or(&5));
    let fps = *matches.get_one::<u32>("fps").unwrap_or(&30);
    let tick_hz = (*matches.get_one::<u32>("tick-hz").unwrap_or(&60)).max(1);

    let source = open_source(&matches, duration, fps);
    let output = open_output(&matches);

    let mut player = VideoPlayer::with_config(config, source, output);
    if let Err(e) = player.play() {
        error!("could not start playback: {}", e);
        process::exit(1);
    }

    let tick = Duration::from_secs_f64(1.0 / tick_hz as f64);
    let mut last = Instant::now();
    let mut last_report = Instant::now();

    while player.state() != PlayState::Stopped {
        std::thread::sleep(tick);
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f32();
        last = now;

        if let Err(e) = player.update(dt) {
            error!("playback failed: {}", e);
            process::exit(1);
        }
        if let Some(frame) = player.take_new_frame() {
            log::trace!("frame {:?}", frame);
        }
        if last_report.elapsed() >= Duration::from_secs(1) {
            info!("{}", player.stats());
            last_report = Instant::now();
        }
    }

    info!(
        "done: complete={} {}",
        player.is_playback_complete(),
        player.stats()
    );
    player.dispose();
}

#[cfg(feature = "ffmpeg")]
fn open_source(matches: &clap::ArgMatches, duration: Duration, fps: u32) -> Box<dyn DecodeBoundary> {
    match matches.get_one::<String>("input") {
        Some(path) => Box::new(mediasync::decoder::ffmpeg::FfmpegSource::new(path)),
        None => test_pattern(duration, fps),
    }
}

#[cfg(not(feature = "ffmpeg"))]
fn open_source(_matches: &clap::ArgMatches, duration: Duration, fps: u32) -> Box<dyn DecodeBoundary> {
    test_pattern(duration, fps)
}

fn test_pattern(duration: Duration, fps: u32) -> Box<dyn DecodeBoundary> {
    Box::new(SyntheticSource::new(SyntheticSpec::test_pattern(
        duration,
        fps,
        Duration::from_millis(20),
    )))
}

#[cfg(feature = "cpal")]
fn open_output(matches: &clap::ArgMatches) -> Box<dyn AudioOutput> {
    if matches.get_flag("device") {
        Box::new(mediasync::audio::CpalOutput::new())
    } else {
        Box::new(NullAudioOutput::realtime())
    }
}

#[cfg(not(feature = "cpal"))]
fn open_output(_matches: &clap::ArgMatches) -> Box<dyn AudioOutput> {
    Box::new(NullAudioOutput::realtime())
}

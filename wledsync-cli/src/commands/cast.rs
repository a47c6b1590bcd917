//! Cast command - stream a source to LED devices

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{info, warn};
use wledsync_core::{
    action::CastAction,
    capture::FrameQueues,
    config::{ChannelLayout, ConfigFile, FlipMode, Interpolation, TextEffect},
    ipc::{self, IpcServer},
    matrix::parse_cast_devices,
    mobile::{self, MobileServer},
    pipeline::Pipeline,
    CastConfig, CastSource, Protocol, Scheduler,
};

/// Arguments for the cast command
#[derive(Args)]
pub struct CastArgs {
    /// What to cast: desktop, desktop:<monitor>, win=<title>, area=x,y,w,h,
    /// queue[:<name>], a camera index, or an image/video path
    #[arg(default_value = "desktop")]
    source: String,

    /// Configuration file (default: ~/.config/wledvideosync/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Name shown in logs and status
    #[arg(long)]
    name: Option<String>,

    /// Protocol: ddp, e131, artnet, other
    #[arg(short, long)]
    protocol: Option<Protocol>,

    /// Device IP or hostname (multicast/broadcast for e1.31/Art-Net)
    #[arg(long)]
    host: Option<String>,

    /// Destination port (default: protocol port)
    #[arg(long)]
    port: Option<u16>,

    /// Frames per second
    #[arg(short, long)]
    fps: Option<u32>,

    /// Output width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Keep the source aspect ratio
    #[arg(long)]
    keep_ratio: bool,

    /// Resampling: nearest, linear, cubic, area, lanczos
    #[arg(long)]
    interpolation: Option<Interpolation>,

    /// Extra sends per packet
    #[arg(long)]
    retry: Option<u32>,

    /// Media replays, -1 for forever
    #[arg(long, allow_negative_numbers = true)]
    repeat: Option<i32>,

    /// Gamma correction
    #[arg(long)]
    gamma: Option<f64>,

    /// Automatic brightness and contrast
    #[arg(long)]
    auto_bright: bool,

    /// Histogram percentage clipped by --auto-bright
    #[arg(long)]
    clip_hist: Option<f64>,

    /// Saturation in percent
    #[arg(long, allow_negative_numbers = true)]
    saturation: Option<i32>,

    /// Brightness in percent
    #[arg(long, allow_negative_numbers = true)]
    brightness: Option<i32>,

    /// Contrast in percent
    #[arg(long, allow_negative_numbers = true)]
    contrast: Option<i32>,

    /// Sharpen strength in percent
    #[arg(long)]
    sharpen: Option<i32>,

    /// Color balance factors r,g,b (0 leaves a channel untouched)
    #[arg(long, value_delimiter = ',', num_args = 3)]
    balance: Option<Vec<f64>>,

    /// Mirror the frame: vertical, horizontal, both
    #[arg(long, num_args = 0..=1, default_missing_value = "vertical")]
    flip: Option<FlipMode>,

    /// Scroll this text over the cast
    #[arg(long)]
    text: Option<String>,

    /// Text effect: none, blink, fade, color_cycle, rainbow_cycle
    #[arg(long)]
    text_effect: Option<TextEffect>,

    /// Use the WLED API for matrix size and live mode
    #[arg(long)]
    wled: bool,

    /// HTTP port of the WLED API
    #[arg(long)]
    wled_port: Option<u16>,

    /// Stay in live mode after the cast
    #[arg(long)]
    keep_live: bool,

    /// Keep the first processed frames for cast_image
    #[arg(long)]
    put_to_buffer: bool,

    /// Snapshot and frame buffer capacity
    #[arg(long)]
    frame_max: Option<usize>,

    /// Cast to several devices
    #[arg(long)]
    multicast: bool,

    /// Devices per row
    #[arg(long)]
    cast_x: Option<u32>,

    /// Devices per column
    #[arg(long)]
    cast_y: Option<u32>,

    /// Device list: "[(0,'192.168.1.10'),(1,'192.168.1.11')]"
    #[arg(long)]
    devices: Option<String>,

    /// First DMX universe
    #[arg(long)]
    universe: Option<u16>,

    /// DMX pixel count (0 = width x height)
    #[arg(long)]
    pixel_count: Option<usize>,

    /// Channels per DMX universe
    #[arg(long)]
    universe_size: Option<usize>,

    /// Channel offset inside the first universe
    #[arg(long)]
    channel_offset: Option<usize>,

    /// 3 for RGB, 4 for RGBW
    #[arg(long)]
    channels_per_pixel: Option<u8>,

    /// e1.31 priority
    #[arg(long)]
    priority: Option<u8>,

    /// Start the mobile stream server
    #[arg(long)]
    mobile: bool,
}

impl CastArgs {
    /// Apply command line overrides on top of the file settings
    fn apply(&self, config: &mut CastConfig) -> Result<()> {
        if let Some(ref name) = self.name {
            config.name = name.clone();
        }
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }
        if let Some(ref host) = self.host {
            config.host = host.clone();
        }
        if self.port.is_some() {
            config.port = self.port;
        }
        if let Some(fps) = self.fps {
            config.rate = fps;
        }
        if let Some(width) = self.width {
            config.scale_width = width;
        }
        if let Some(height) = self.height {
            config.scale_height = height;
        }
        config.keep_ratio |= self.keep_ratio;
        if let Some(interpolation) = self.interpolation {
            config.interpolation = interpolation;
        }
        if let Some(retry) = self.retry {
            config.retry_number = retry;
        }
        if let Some(repeat) = self.repeat {
            config.repeat = repeat;
        }
        config.wled |= self.wled;
        if let Some(port) = self.wled_port {
            config.wled_port = port;
        }
        if self.keep_live {
            config.wled_live_off = false;
        }
        config.put_to_buffer |= self.put_to_buffer;
        if let Some(frame_max) = self.frame_max {
            config.frame_max = frame_max;
        }

        if let Some(ref text) = self.text {
            config.text.enabled = true;
            config.text.text = text.clone();
        }
        if let Some(effect) = self.text_effect {
            config.text.effect = effect;
        }

        let color = &mut config.color;
        if let Some(gamma) = self.gamma {
            color.gamma = gamma;
        }
        color.auto_bright |= self.auto_bright;
        if let Some(clip) = self.clip_hist {
            color.clip_hist_percent = clip;
        }
        if let Some(saturation) = self.saturation {
            color.saturation = saturation;
        }
        if let Some(brightness) = self.brightness {
            color.brightness = brightness;
        }
        if let Some(contrast) = self.contrast {
            color.contrast = contrast;
        }
        if let Some(sharpen) = self.sharpen {
            color.sharpen = sharpen;
        }
        if let Some(ref balance) = self.balance {
            if let [r, g, b] = balance[..] {
                color.balance_r = r;
                color.balance_g = g;
                color.balance_b = b;
            }
        }
        if let Some(mode) = self.flip {
            color.flip = true;
            color.flip_mode = mode;
        }

        let multicast = &mut config.multicast;
        multicast.enabled |= self.multicast;
        if let Some(cast_x) = self.cast_x {
            multicast.cast_x = cast_x;
        }
        if let Some(cast_y) = self.cast_y {
            multicast.cast_y = cast_y;
        }
        if let Some(ref devices) = self.devices {
            multicast.devices = parse_cast_devices(devices)?;
        }

        let layout = self
            .channels_per_pixel
            .map(ChannelLayout::try_from)
            .transpose()
            .map_err(anyhow::Error::msg)?;
        if let Some(universe) = self.universe {
            config.e131.universe = universe;
            config.artnet.universe = universe;
        }
        if let Some(count) = self.pixel_count {
            config.e131.pixel_count = count;
            config.artnet.pixel_count = count;
        }
        if let Some(size) = self.universe_size {
            config.e131.universe_size = size;
            config.artnet.universe_size = size;
        }
        if let Some(offset) = self.channel_offset {
            config.e131.channel_offset = offset;
            config.artnet.channel_offset = offset;
        }
        if let Some(layout) = layout {
            config.e131.channels_per_pixel = layout;
            config.artnet.channels_per_pixel = layout;
        }
        if let Some(priority) = self.priority {
            config.e131.priority = priority;
        }

        Ok(())
    }
}

/// Start a cast and run it until stopped
pub async fn cast(args: CastArgs) -> Result<()> {
    println!("WLEDVideoSync - Starting Cast\n");

    if ipc::cast_running().await {
        bail!("A cast is already running, stop it first with 'wledvideosync stop'");
    }

    let file = match &args.config {
        Some(path) => ConfigFile::load_from(path.clone()),
        None => ConfigFile::load(),
    }
    .context("Failed to load configuration")?;

    let source: CastSource = args.source.parse()?;
    let mut config = file.to_cast_config(source)?;
    args.apply(&mut config)?;

    println!("Configuration:");
    println!("  Source:      {}", config.source);
    println!("  Protocol:    {}", config.protocol);
    println!("  Host:        {}:{}", config.host, config.effective_port());
    println!("  Size:        {}x{}", config.scale_width, config.scale_height);
    println!("  Framerate:   {} fps", config.rate);
    if config.multicast.enabled {
        println!(
            "  Matrix:      {}x{} ({} devices)",
            config.multicast.cast_x,
            config.multicast.cast_y,
            config.multicast.devices.len()
        );
    }
    println!();

    let queues = FrameQueues::with_settings(mobile::queue_settings(&file.mobile)?);

    // Mobile server first so queue sources get frames from the start
    let (mobile_stop, mobile_task) = if args.mobile || file.mobile.enabled {
        let server = MobileServer::bind(&file.mobile, queues.clone()).await?;
        println!("Mobile stream on ws://{}/mobile", server.local_addr()?);
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve(async move {
            let _ = rx.await;
        }));
        (Some(tx), Some(task))
    } else {
        (None, None)
    };

    let mut pipeline = Pipeline::new(config, &queues)
        .await
        .context("Failed to create cast")?;
    let actions = pipeline.actions();

    let mut server = IpcServer::new(actions.clone());
    server.start().await.context("Failed to start control socket")?;
    let mut force_stop = server.shutdown_receiver();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            warn!("Control socket stopped: {}", e);
        }
    });

    let mut scheduler = Scheduler::spawn(&file.schedule, actions.clone())?;

    let interrupt = actions.clone();
    let interrupt_task = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            println!("\nReceived interrupt signal...");
            let _ = interrupt.send(CastAction::Stop).await;
        }
    });

    pipeline.start().await.context("Failed to start cast")?;
    println!("Casting! Press Ctrl+C or run 'wledvideosync stop' to stop...\n");

    let outcome = tokio::select! {
        result = pipeline.run_until_stopped() => Some(result),
        _ = force_stop.recv() => None,
    };

    scheduler.stop();
    interrupt_task.abort();
    server_task.abort();
    if let Some(tx) = mobile_stop {
        let _ = tx.send(());
    }
    if let Some(task) = mobile_task {
        match task.await {
            Ok(Err(e)) => warn!("{}", e),
            Err(e) => warn!("Mobile server task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }

    match outcome {
        Some(Ok(stats)) => {
            println!("Cast stopped.");
            println!("  {}", stats);
            println!("  {}", stats.latency.format_overlay());
            info!("{}", stats.latency.format_detailed());
        }
        Some(Err(e)) => return Err(e).context("Cast failed"),
        None => println!("Cast force stopped."),
    }

    Ok(())
}

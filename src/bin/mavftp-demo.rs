//! Command-line driver for `mavftp`, for testing and development only.
//! Normally the engine is driven from another program.
//!
//! Grounded on `original_source/examples/mavftp_example.py` for the overall
//! shape (connect, wait for heartbeat, run one or more operations against a
//! single open connection) and on `patrickelectric-mavftp-cli/src/controller.rs`
//! for the progress-bar style.

use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use mavlink::MavConnection;
use structopt::StructOpt;

use mavftp::{decode_param_blob, EntryKind, FtpSettings, MavFtpEngine, MavlinkTransport};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "mavftp-demo",
    about = "This binary is for testing and development only. Usually mavftp is driven from another program."
)]
struct Opt {
    /// Serial device or connection string accepted by `mavlink::connect`
    /// (e.g. "serial:/dev/ttyUSB0:115200" or "udpin:0.0.0.0:14550").
    #[structopt(long)]
    device: String,

    #[structopt(long, default_value = "250")]
    source_system: u8,

    #[structopt(long)]
    list: Option<String>,

    #[structopt(long)]
    get: Option<String>,

    #[structopt(long)]
    put: Option<String>,

    #[structopt(long, default_value = "1000")]
    timeout_secs: u64,

    #[structopt(long, default_value = "@PARAM/param.pck?withdefaults=1")]
    filename: String,

    #[structopt(long)]
    decode_parameters: bool,
}

fn wait_heartbeat(conn: &dyn MavConnection<mavlink::common::MavMessage>) -> (u8, u8) {
    log::info!("waiting for flight controller heartbeat");
    loop {
        if let Ok((header, mavlink::common::MavMessage::HEARTBEAT(_))) = conn.recv() {
            log::info!(
                "got heartbeat from system {}, component {}",
                header.system_id,
                header.component_id
            );
            return (header.system_id, header.component_id);
        }
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        )
        .unwrap()
        .with_key("eta", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
            write!(w, "{:.1}s", state.eta().as_secs_f64()).unwrap()
        })
        .progress_chars("#>-"),
    );
    bar
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    log::warn!("this binary is for testing and development only");

    let conn: Arc<dyn MavConnection<mavlink::common::MavMessage> + Send + Sync> =
        mavlink::connect(&opt.device).expect("failed to open connection").into();
    let (target_system, target_component) = wait_heartbeat(conn.as_ref());

    let transport = MavlinkTransport::new(conn, opt.source_system, 1);
    let mut engine = MavFtpEngine::new(transport, target_system, target_component, FtpSettings::default());
    let timeout = Duration::from_secs(opt.timeout_secs);

    if let Some(path) = opt.list {
        engine.list(
            &path,
            |entry| {
                let kind = match entry.kind {
                    EntryKind::File => 'F',
                    EntryKind::Directory => 'D',
                    EntryKind::Skip => 'S',
                };
                println!("{kind:<4} {:<30} {:<10}", entry.name, entry.size);
            },
            || {},
        );
        if let Err(err) = engine.execute(timeout) {
            log::error!("list failed: {err}");
            exit(1);
        }
        return;
    }

    if let Some(remote) = opt.get.or_else(|| Some(opt.filename.clone())) {
        let bar: std::rc::Rc<std::cell::RefCell<Option<ProgressBar>>> =
            std::rc::Rc::new(std::cell::RefCell::new(None));
        let bar2 = bar.clone();
        let decode_parameters = opt.decode_parameters;
        engine.get(
            &remote,
            Some("-"),
            Some(move |fh| {
                use std::io::Read;
                let Some(mut fh) = fh else {
                    log::error!("get failed");
                    exit(1);
                };
                let mut data = Vec::new();
                fh.read_to_end(&mut data).ok();
                log::info!("param get done! got {} bytes", data.len());
                if decode_parameters {
                    match decode_param_blob(&data) {
                        Ok(table) => {
                            for entry in &table.params {
                                println!("{} {}", String::from_utf8_lossy(&entry.name), entry.value.value);
                            }
                        }
                        Err(err) => {
                            log::error!("param decode failed: {err}");
                            exit(1);
                        }
                    }
                }
            }),
            Some(move |progress: Option<(u64, u64)>| {
                let mut bar = bar2.borrow_mut();
                match progress {
                    Some((done, total)) => {
                        if bar.is_none() {
                            *bar = Some(progress_bar(total));
                        }
                        bar.as_ref().unwrap().set_position(done);
                    }
                    None => {
                        if let Some(bar) = bar.take() {
                            bar.finish();
                        }
                    }
                }
            }),
        );
        if let Err(err) = engine.execute(timeout) {
            log::error!("get failed: {err}");
            exit(1);
        }
        return;
    }

    if let Some(local) = opt.put {
        engine
            .put(
                &local,
                None,
                None,
                Some(|result: Option<u64>| match result {
                    Some(bytes) => log::info!("put done, {bytes} bytes"),
                    None => log::error!("put failed"),
                }),
                None::<fn(Option<f64>)>,
            )
            .unwrap_or_else(|err| {
                log::error!("put failed to start: {err}");
                exit(1);
            });
        if let Err(err) = engine.execute(timeout) {
            log::error!("put failed: {err}");
            exit(1);
        }
        return;
    }

    log::warn!("nothing to do: pass --list, --get or --put");
}

//! Locksmith lock store recovery inspector.
//!
//! Recovers every paxos group of a topic from its durable stores, reports
//! what a restarting lock server would resume from, and optionally marks
//! restart checkpoints ahead of a planned shutdown.

use std::process::ExitCode;

use clap::Parser;
use locksmith::{
    LockDb, LockManager, LockMgrConfig, LocksmithError, NO_CHECKPOINT, ME,
    logger_init, pf_error, pf_info,
};
use tokio::runtime::Builder;

/// Command line arguments definition.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Base path of the group stores; group N lives at `<base_path>N`.
    #[arg(short, long)]
    base_path: String,

    /// Topic ID whose groups are inspected.
    #[arg(short, long, default_value_t = 0)]
    topic_id: u32,

    /// Number of paxos groups of the topic.
    #[arg(short = 'n', long, default_value_t = 1)]
    nr_group: usize,

    /// Lock manager config overrides in TOML format.
    #[arg(short, long)]
    config: Option<String>,

    /// Write each group's restart checkpoint as its resume point.
    #[arg(long, default_value_t = false)]
    mark_restart: bool,

    /// Number of tokio worker threads.
    #[arg(long, default_value_t = 4)]
    threads: usize,
}

impl CliArgs {
    /// Sanitize command line arguments, return `Ok(config)` on success
    /// or `Err(LocksmithError)` on any error.
    fn sanitize(&self) -> Result<LockMgrConfig, LocksmithError> {
        if self.base_path.is_empty() {
            Err(LocksmithError::config("empty base_path"))
        } else if self.nr_group == 0 {
            Err(LocksmithError::config(format!(
                "invalid nr_group {}",
                self.nr_group
            )))
        } else if self.threads == 0 {
            Err(LocksmithError::config(format!(
                "invalid number of threads {}",
                self.threads
            )))
        } else {
            let mut config = LockMgrConfig::parse(self.config.as_deref())?;
            config.topic_id = self.topic_id;
            config.nr_group = self.nr_group;
            Ok(config)
        }
    }
}

/// Formats an instance ID, spelling out the sentinel.
fn fmt_instance(instance_id: u64) -> String {
    if instance_id == NO_CHECKPOINT {
        "none".into()
    } else {
        instance_id.to_string()
    }
}

/// Recovers all groups, reports them, and optionally marks restart
/// checkpoints.
async fn inspect(
    args: &CliArgs,
    config: LockMgrConfig,
) -> Result<(), LocksmithError> {
    let mut mgr = LockManager::new(config);
    mgr.init(&args.base_path).await?;

    let mut result = Ok(());
    for group_id in 0..mgr.nr_group() {
        let last_instance_id = mgr.last_instance_id(group_id)?;
        pf_info!(
            "group {} checkpoint {} restart_checkpoint {} last_instance_id {} leases {}",
            group_id,
            fmt_instance(mgr.checkpoint(group_id)?),
            fmt_instance(mgr.restart_checkpoint(group_id)?),
            fmt_instance(last_instance_id),
            mgr.volatile_db(group_id)?.len()
        );

        if args.mark_restart && last_instance_id != NO_CHECKPOINT {
            if let Err(e) = mgr
                .write_restart_checkpoint(group_id, last_instance_id)
                .await
            {
                result = Err(e);
            } else {
                pf_info!(
                    "group {} marked restart_checkpoint {}",
                    group_id,
                    last_instance_id
                );
            }
        }
    }

    mgr.dispose().await?;
    result
}

/// Actual main function of the inspector.
fn admin_main() -> Result<(), LocksmithError> {
    // read in and parse command line arguments
    let args = CliArgs::parse();
    let config = args.sanitize()?;

    // create tokio multi-threaded runtime
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .worker_threads(args.threads)
        .thread_name("tokio-worker-admin")
        .build()?;

    runtime.block_on(inspect(&args, config))
}

/// Main function of the inspector.
fn main() -> ExitCode {
    logger_init();
    let _ = ME.set("admin".into());

    if let Err(ref e) = admin_main() {
        pf_error!("admin_main exited: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

//! CLI command implementations

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::info;

use passlock_core::{
    FileLockoutStore, FilePasscodeRepository, LockConfig, LockController, LockEvent,
    LockNotification, LockNotifier, LockoutRecord, LockoutStore, PasscodeRepository,
    PasscodeState, Prompt, StateKind,
};

const PASSCODE_FILE: &str = "passcode.json";
const LOCKOUT_FILE: &str = "lockout.json";

/// Passlock - passcode lock driven from the terminal
#[derive(Parser)]
#[command(name = "passlock")]
#[command(about = "Set, change, remove and enter a numeric passcode")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the passcode and lockout files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Lock configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show whether a passcode is set and the lockout state
    Status,

    /// Choose a passcode and confirm it
    Set,

    /// Verify the current passcode, then choose a new one
    Change,

    /// Verify the current passcode and delete it
    Remove,

    /// Unlock with the stored passcode
    Enter,

    /// Unlock, succeeding immediately when no passcode is set
    EnterOptional,

    /// Acknowledge a reached attempt limit so entry is allowed again
    Acknowledge,

    /// Clear the attempt counter and any backoff window
    ResetLockout,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("passlock")
}

/// Run the CLI, reading passcode input from stdin
pub async fn run(cli: Cli) -> Result<()> {
    execute(cli, BufReader::new(tokio::io::stdin())).await
}

/// Run the CLI, reading passcode input from `input`
pub async fn execute<R>(cli: Cli, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let config = match &cli.config {
        Some(path) => LockConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => LockConfig::default(),
    };

    let repository = FilePasscodeRepository::open(data_dir.join(PASSCODE_FILE))
        .with_context(|| format!("Failed to open passcode file in {}", data_dir.display()))?;
    let mut store = FileLockoutStore::new(data_dir.join(LOCKOUT_FILE));

    match cli.command {
        Commands::Status => {
            let lock = LockController::new(PasscodeState::enter(), config, repository, store)
                .context("Invalid lock configuration")?;

            println!("\n=== Passlock Status ===\n");
            println!("Data directory:      {}", data_dir.display());
            println!(
                "Passcode set:        {}",
                if lock.repository().has_passcode() { "yes" } else { "no" }
            );
            println!("Passcode length:     {}", lock.config().passcode_length);
            match lock.config().maximum_incorrect_attempts.threshold() {
                Some(max) => println!("Attempt limit:       {}", max),
                None => println!("Attempt limit:       unlimited"),
            }
            println!("Incorrect attempts:  {}", lock.incorrect_attempts());
            if lock.lockout_threshold_reached() {
                println!("Attempt limit was reached; run `passlock acknowledge` to unlock entry");
            }
            if let Some(remaining) = lock.lockout_remaining() {
                println!("Entry blocked for:   {}s", remaining.as_secs().max(1));
            }
        }

        Commands::Acknowledge => {
            let mut record = store.load().context("Failed to read lockout state")?;
            if record.threshold_reached {
                record.threshold_reached = false;
                store.save(&record).context("Failed to update lockout state")?;
                info!("Attempt limit acknowledged in {:?}", store.path());
            }
            println!("Passcode entry unlocked");
        }

        Commands::ResetLockout => {
            store
                .save(&LockoutRecord::default())
                .context("Failed to reset lockout state")?;
            info!("Lockout state reset in {:?}", store.path());
            println!("Lockout state cleared");
        }

        Commands::Set => {
            if repository.has_passcode() {
                bail!("A passcode is already set; use `passlock change`");
            }
            drive(PasscodeState::set(), config, repository, store, input).await?;
        }

        Commands::Change => {
            if !repository.has_passcode() {
                bail!("No passcode is set; use `passlock set`");
            }
            drive(PasscodeState::change(), config, repository, store, input).await?;
        }

        Commands::Remove => {
            if !repository.has_passcode() {
                bail!("No passcode is set");
            }
            drive(PasscodeState::remove(), config, repository, store, input).await?;
        }

        Commands::Enter => {
            drive(PasscodeState::enter(), config, repository, store, input).await?;
        }

        Commands::EnterOptional => {
            drive(PasscodeState::enter_optional(), config, repository, store, input).await?;
        }
    }

    Ok(())
}

/// A single character of passcode input
#[derive(Debug, PartialEq, Eq)]
enum Key {
    Digit(char),
    Delete,
    Clear,
    Skip,
    Invalid(char),
}

impl From<char> for Key {
    fn from(token: char) -> Self {
        match token {
            '-' => Key::Delete,
            'x' => Key::Clear,
            c if c.is_ascii_digit() => Key::Digit(c),
            c if c.is_whitespace() => Key::Skip,
            c => Key::Invalid(c),
        }
    }
}

/// Where a passcode session stands after the latest key
#[derive(Debug, PartialEq, Eq)]
enum Progress {
    Continue,
    Succeeded,
    Locked,
}

/// Feed `input` into a lock until the first success
///
/// Fails at end of input without a success, and when the attempt limit
/// is reached or was reached earlier and not yet acknowledged.
async fn drive<R>(
    state: PasscodeState,
    config: LockConfig,
    repository: FilePasscodeRepository,
    store: FileLockoutStore,
    input: R,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let (tx, mut events) = mpsc::unbounded_channel();
    let notifier = LockNotifier::new();
    let mut notifications = notifier.subscribe();

    let mut lock = LockController::new(state, config, repository, store)
        .context("Invalid lock configuration")?
        .with_observer(tx)
        .with_notifier(notifier);

    if lock.lockout_threshold_reached() && lock.state().kind() != StateKind::SetPasscode {
        bail!("Too many incorrect passcodes; run `passlock acknowledge` first");
    }

    println!("{}", prompt_text(lock.prompt()));
    println!("(digits to type, '-' to delete, 'x' to clear)");

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        for token in line.chars() {
            match Key::from(token) {
                Key::Digit(c) => lock.add_digit(c),
                Key::Delete => lock.remove_digit(),
                Key::Clear => lock.cancel(),
                Key::Skip => continue,
                Key::Invalid(c) => {
                    println!("Ignored '{}': passcodes are digits only", c);
                    continue;
                }
            }

            let progress = report(&mut events, lock.config().passcode_length);
            report_notifications(&mut notifications);
            match progress {
                Progress::Continue => {}
                Progress::Succeeded => return Ok(()),
                Progress::Locked => {
                    bail!("Too many incorrect passcodes; run `passlock acknowledge` to retry")
                }
            }
        }
    }

    info!("End of input");
    bail!("Input ended before the passcode was accepted")
}

/// Print pending events and say how the session stands
fn report(events: &mut mpsc::UnboundedReceiver<LockEvent>, length: usize) -> Progress {
    let mut progress = Progress::Continue;

    while let Ok(event) = events.try_recv() {
        match event {
            LockEvent::DigitAdded(index) => println!("{}", masked(index + 1, length)),
            LockEvent::DigitRemoved(index) => println!("{}", masked(index, length)),
            LockEvent::StateChanged(kind) => println!("State: {:?}", kind),
            // The flow restarts after a success; its next prompt is not shown
            LockEvent::PromptChanged(_) if progress == Progress::Succeeded => {}
            LockEvent::PromptChanged(prompt) => println!("{}", prompt_text(prompt)),
            LockEvent::Succeeded => {
                println!("Success");
                progress = Progress::Succeeded;
            }
            LockEvent::Failed { attempt: 0 } => println!("Passcodes did not match, try again"),
            LockEvent::Failed { attempt } => {
                println!("Incorrect passcode ({} consecutive)", attempt)
            }
            LockEvent::LockoutThresholdReached { attempt } => {
                println!("Too many incorrect passcodes ({})", attempt);
                progress = Progress::Locked;
            }
            LockEvent::EntryBlocked { remaining } => {
                println!("Try again in {}s", remaining.as_secs().max(1))
            }
            LockEvent::Cancelled => println!("Cleared"),
        }
    }

    progress
}

fn masked(filled: usize, length: usize) -> String {
    format!("[{}{}]", "*".repeat(filled), "_".repeat(length.saturating_sub(filled)))
}

fn report_notifications(notifications: &mut broadcast::Receiver<LockNotification>) {
    loop {
        match notifications.try_recv() {
            Ok(notification) => println!("Notification: {}", notification.name()),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

fn prompt_text(prompt: Prompt) -> &'static str {
    match prompt {
        Prompt::EnterPasscode => "Enter passcode",
        Prompt::EnterCurrentPasscode => "Enter your current passcode",
        Prompt::EnterNewPasscode => "Enter a new passcode",
        Prompt::ConfirmNewPasscode => "Re-enter the new passcode",
        Prompt::RemovePasscode => "Enter passcode to remove it",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_options() {
        let cli = Cli::try_parse_from([
            "passlock",
            "--data-dir",
            "/tmp/passlock",
            "--config",
            "lock.toml",
            "enter-optional",
        ])
        .unwrap();

        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/passlock")));
        assert_eq!(cli.config, Some(PathBuf::from("lock.toml")));
        assert!(matches!(cli.command, Commands::EnterOptional));
    }

    #[test]
    fn test_report_tracks_progress() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(LockEvent::DigitAdded(0)).unwrap();
        assert_eq!(report(&mut rx, 4), Progress::Continue);

        tx.send(LockEvent::Succeeded).unwrap();
        tx.send(LockEvent::PromptChanged(Prompt::EnterNewPasscode)).unwrap();
        assert_eq!(report(&mut rx, 4), Progress::Succeeded);

        tx.send(LockEvent::Failed { attempt: 3 }).unwrap();
        tx.send(LockEvent::LockoutThresholdReached { attempt: 3 }).unwrap();
        assert_eq!(report(&mut rx, 4), Progress::Locked);
    }

    #[test]
    fn test_only_digits_reach_the_lock() {
        assert_eq!(Key::from('7'), Key::Digit('7'));
        assert_eq!(Key::from('-'), Key::Delete);
        assert_eq!(Key::from('x'), Key::Clear);
        assert_eq!(Key::from(' '), Key::Skip);
        assert_eq!(Key::from('a'), Key::Invalid('a'));
        assert_eq!(Key::from('٣'), Key::Invalid('٣'));
    }

    async fn invoke(dir: &std::path::Path, args: &[&str], input: &str) -> Result<()> {
        let mut argv = vec!["passlock", "--data-dir", dir.to_str().unwrap()];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();
        execute(cli, input.as_bytes()).await
    }

    #[tokio::test]
    async fn test_set_ignores_letters() {
        let dir = tempfile::tempdir().unwrap();

        assert!(invoke(dir.path(), &["set"], "abcd\nabcd\n").await.is_err());
        assert!(!dir.path().join(PASSCODE_FILE).exists());

        invoke(dir.path(), &["set"], "1a3b5c7d\n1357\n").await.unwrap();
        let repository = FilePasscodeRepository::open(dir.path().join(PASSCODE_FILE)).unwrap();
        assert_eq!(repository.passcode(), Some(passlock_core::Passcode::from("1357")));
    }

    #[tokio::test]
    async fn test_enter_fails_at_end_of_input_without_success() {
        let dir = tempfile::tempdir().unwrap();
        invoke(dir.path(), &["set"], "1357\n1357\n").await.unwrap();

        assert!(invoke(dir.path(), &["enter"], "0000\n").await.is_err());
        let store = FileLockoutStore::new(dir.path().join(LOCKOUT_FILE));
        assert_eq!(store.load().unwrap().incorrect_attempts, 1);

        invoke(dir.path(), &["enter"], "1357\n").await.unwrap();
        assert_eq!(store.load().unwrap().incorrect_attempts, 0);
    }

    #[tokio::test]
    async fn test_entry_refused_until_limit_acknowledged() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("lock.toml");
        std::fs::write(&config, "passcode_length = 4\nmaximum_incorrect_attempts = 2\n").unwrap();
        let config = config.to_str().unwrap();

        invoke(dir.path(), &["--config", config, "set"], "1357\n1357\n")
            .await
            .unwrap();

        // The session ends at the limit; the trailing correct entry is not read
        assert!(invoke(dir.path(), &["--config", config, "enter"], "0000\n0000\n1357\n")
            .await
            .is_err());
        assert!(invoke(dir.path(), &["--config", config, "enter"], "1357\n")
            .await
            .is_err());

        invoke(dir.path(), &["acknowledge"], "").await.unwrap();
        let store = FileLockoutStore::new(dir.path().join(LOCKOUT_FILE));
        assert!(!store.load().unwrap().threshold_reached);

        invoke(dir.path(), &["--config", config, "enter"], "1357\n")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reset_lockout_clears_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileLockoutStore::new(dir.path().join(LOCKOUT_FILE));
        store
            .save(&LockoutRecord {
                incorrect_attempts: 2,
                ..Default::default()
            })
            .unwrap();

        let cli = Cli::try_parse_from([
            "passlock",
            "--data-dir",
            dir.path().to_str().unwrap(),
            "reset-lockout",
        ])
        .unwrap();
        run(cli).await.unwrap();

        assert_eq!(store.load().unwrap().incorrect_attempts, 0);
    }
}

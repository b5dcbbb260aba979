use anyhow::{Context, Result, bail};
use argh::FromArgs;
use fshell::{CommandView, DEFAULT_CHANNEL, ExecutionMode, Output, ResultCode, Shell, ShellConfig, ipc};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// Run an fshell instance, or send one command line to a running daemon.
struct Args {
    /// application name shown in the prompt and welcome header
    #[argh(option, default = "String::from(\"fshell\")")]
    name: String,

    /// serve commands over IPC instead of reading from the terminal
    #[argh(switch)]
    daemon: bool,

    /// IPC channel name or socket path (default: fshell_ctrl)
    #[argh(option)]
    channel: Option<String>,

    /// send this command line to a running daemon and print its output
    #[argh(option)]
    send: Option<String>,
}

impl Args {
    fn channel(&self) -> &str {
        self.channel
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CHANNEL)
    }
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    init_tracing();

    match &args.send {
        Some(line) => send(&args, line),
        None => run(&args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FSHELL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<()> {
    let shell = Shell::new(&args.name)?;
    register_demo_commands(&shell)?;

    if args.daemon {
        shell.set_execution_mode(ExecutionMode::daemon(Some(args.channel())))?;
        if let Some(path) = shell.channel_path() {
            eprintln!("{} listening on {}", args.name, path.display());
        }
    }

    let stop = shell.stop_handle();
    ctrlc::set_handler(move || {
        if let Err(e) = stop.stop() {
            debug!(error = %e, "Ctrl+C while no loop is running");
        }
    })
    .context("failed to install the Ctrl+C handler")?;

    shell.run().context("shell stopped with an error")?;
    info!("bye");
    Ok(())
}

fn send(args: &Args, line: &str) -> Result<()> {
    let path = ShellConfig::new(args.name.as_str()).channel_path(args.channel());
    let response = ipc::send_command(&path, line)
        .with_context(|| format!("failed to reach the daemon at {}", path.display()))?;
    print!("{}", response.output);
    if !response.is_ok() {
        bail!(
            "{}: {}",
            response.status,
            response.error.unwrap_or_default()
        );
    }
    Ok(())
}

fn register_demo_commands(shell: &Shell) -> Result<()> {
    shell.register_command("echo", "Print the arguments (-n: no trailing newline)", echo)?;
    shell.register_command("whoami", "Show the session this command runs in", whoami)?;
    Ok(())
}

fn echo(cmd: &CommandView<'_>, out: &Output<'_>) -> ResultCode {
    let text = cmd.positionals().join(" ");
    if cmd.has_flag("n") {
        out.print(&text);
    } else {
        out.println(&text);
    }
    ResultCode::Ok
}

fn whoami(_cmd: &CommandView<'_>, out: &Output<'_>) -> ResultCode {
    match out.session_id() {
        Some(id) => out.println(&format!("session {id}")),
        None => out.println("console"),
    }
    ResultCode::Ok
}

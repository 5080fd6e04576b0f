use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vsh::{ExecResult, ExecutionLimits, Shell, ShellBuilder};
use vsh_config::{LogFormat, VshConfig};

mod completer;

/// vsh - a sandboxed shell over a virtual filesystem
#[derive(Parser, Debug)]
#[command(name = "vsh", version, about)]
struct Args {
    /// Execute command and exit
    #[arg(short = 'c')]
    command: Option<String>,

    /// Script file to execute (read from the host filesystem)
    script: Option<String>,

    /// Configuration file, replacing the default search path
    #[arg(long, env = "VSH_CONFIG")]
    config: Option<String>,

    /// Initial working directory inside the virtual filesystem
    #[arg(long)]
    cwd: Option<String>,

    /// Print the parsed AST as JSON instead of executing
    #[arg(long)]
    dump_ast: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => vsh_config::load_from_file(path)?,
        None => vsh_config::load().unwrap_or_else(|e| {
            eprintln!("vsh: ignoring configuration: {e}");
            VshConfig::default()
        }),
    };

    init_logging(&config);

    let source = if let Some(command) = &args.command {
        Some(command.clone())
    } else if let Some(path) = &args.script {
        match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) => {
                eprintln!("vsh: cannot read '{path}': {e}");
                std::process::exit(127);
            }
        }
    } else {
        None
    };

    if args.dump_ast {
        let Some(source) = source else {
            eprintln!("vsh: --dump-ast needs -c COMMAND or a script");
            std::process::exit(2);
        };
        match vsh::parse(&source) {
            Ok(script) => println!("{}", serde_json::to_string_pretty(&script)?),
            Err(e) => {
                eprintln!("vsh: {e}");
                std::process::exit(2);
            }
        }
        return Ok(());
    }

    let mut shell = build_shell(&config, args.cwd.as_deref());

    if let Some(source) = source {
        let result = shell.exec(&source).await;
        emit(&result);
        std::process::exit(i32::from(result.exit_code));
    }

    let code = run_repl(&mut shell, &config.shell).await?;
    std::process::exit(i32::from(code));
}

fn init_logging(config: &VshConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.directive()));

    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Pretty => registry.with(fmt.pretty()).init(),
        LogFormat::Json => registry.with(fmt.json()).init(),
        LogFormat::Compact => registry.with(fmt.compact()).init(),
    }
}

fn build_shell(config: &VshConfig, cwd: Option<&str>) -> Shell {
    let mut builder = ShellBuilder::new()
        .cwd(cwd.unwrap_or(&config.shell.cwd))
        .limits(ExecutionLimits::from(&config.limits))
        .files(config.shell.files.clone());
    for (name, value) in &config.shell.env {
        builder = builder.env(name, value);
    }
    builder.build()
}

fn emit(result: &ExecResult) {
    use std::io::Write;

    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(result.stdout.as_bytes());
    let _ = stdout.flush();
    let mut stderr = std::io::stderr().lock();
    let _ = stderr.write_all(result.stderr.as_bytes());
    let _ = stderr.flush();
}

async fn run_repl(
    shell: &mut Shell,
    shell_config: &vsh_config::ShellConfig,
) -> Result<u8, Box<dyn std::error::Error>> {
    use completer::VshHelper;
    use rustyline::error::ReadlineError;
    use rustyline::{CompletionType, Config, Editor};

    let rl_config = Config::builder()
        .completion_type(CompletionType::List)
        .max_history_size(shell_config.history.max_entries)?
        .history_ignore_dups(true)?
        .history_ignore_space(true)
        .build();

    let mut rl = Editor::with_config(rl_config)?;
    rl.set_helper(Some(VshHelper::default()));

    let history_path = shell_config
        .history
        .path()
        .filter(|_| shell_config.history.enabled);
    if let Some(path) = &history_path {
        let _ = rl.load_history(path);
    }

    println!("vsh v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");
    println!();

    loop {
        if let Some(helper) = rl.helper_mut() {
            helper.refresh(shell).await;
        }

        match rl.readline(&shell_config.render_prompt(shell.cwd())) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());

                let result = shell.exec(&line).await;
                emit(&result);
                if shell.exit_requested().is_some() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
            }
            Err(ReadlineError::Eof) => {
                println!("exit");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err:?}");
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        if let Err(e) = rl.save_history(path) {
            tracing::debug!(path = %path.display(), error = %e, "could not save history");
        }
    }

    Ok(shell.exit_requested().unwrap_or_else(|| shell.last_exit_code()))
}

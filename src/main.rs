//! readaloud main entry point
//!
//! One-shot mode speaks the text and exits when the engine reports the
//! end of the utterance. Interactive mode keeps the text loaded and maps
//! single keys to speak, pause, resume and stop.

use anyhow::{bail, Context};
use log::{debug, error, info, warn};
use mio::{Events, Interest, Poll, Token};
use readaloud::clipboard::get_from_clipboard;
use readaloud::engine::{create_engine, MemoryEngine, SpeechEngine};
use readaloud::input::{create_default_keymap, parse_input, Shortcut, SHORTCUT_HELP};
use readaloud::session::progress::estimate_duration;
use readaloud::session::{SessionEvent, SessionOutcome, SessionState};
use readaloud::state::{Config, State};
use readaloud::terminal::{get_terminal_size, is_tty, status_line, RawModeGuard};
use readaloud::voice::{LoadStatus, Tiers, Voice};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::process;
use std::time::{Duration, Instant};

/// Token for stdin in mio poll
const STDIN: Token = Token(0);

/// Longest wait for the engine to report voices before speaking anyway
const VOICE_WAIT: Duration = Duration::from_millis(1500);

const USAGE: &str = "\
Usage: readaloud [OPTIONS] [TEXT...]

Text is taken from the arguments, --file, --clipboard, or stdin.

Options:
  --voice NAME       Voice to use (id or part of the name)
  --lang TAG         Target language, e.g. en-US
  --rate F           Speaking rate, 0.1 - 2.0
  --pitch F          Pitch, 0.0 - 2.0
  --volume F         Volume, 0.0 - 1.0
  --file PATH        Read text from a file
  --clipboard        Read text from the clipboard
  --list-voices      List voices ranked for the target language
  --json             With --list-voices: print JSON
  -i, --interactive  Keyboard shortcuts instead of speaking once
  --dry-run          Use a silent engine with sample voices
  --stats            Print statistics on exit
  -d, --debug        Write debug log to readaloud.log
  -h, --help         Show this help
";

#[derive(Debug, Default)]
struct Options {
    text: Vec<String>,
    file: Option<String>,
    clipboard: bool,
    voice: Option<String>,
    lang: Option<String>,
    rate: Option<f32>,
    pitch: Option<f32>,
    volume: Option<f32>,
    list_voices: bool,
    json: bool,
    dry_run: bool,
    interactive: bool,
    stats: bool,
    help: bool,
}

fn main() {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let debug_mode = args.iter().any(|arg| arg == "--debug" || arg == "-d");

    // Initialize logger
    if debug_mode {
        // Debug mode: write to readaloud.log file
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("readaloud.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Warning: Failed to open readaloud.log for debug logging: {}", e);
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }

        info!(
            "readaloud version {} starting (debug mode, logging to readaloud.log)",
            readaloud::VERSION
        );
    } else {
        // Normal mode: minimal logging to stderr, only errors
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Error)
            .init();
    }

    if let Err(e) = run(&args[1..]) {
        error!("Fatal error: {:#}", e);
        eprintln!("{}: {:#}", readaloud::APP_NAME, e);
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> anyhow::Result<Options> {
    let mut options = Options::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => options.help = true,
            "-d" | "--debug" => {}
            "-i" | "--interactive" => options.interactive = true,
            "--list-voices" => options.list_voices = true,
            "--json" => options.json = true,
            "--dry-run" => options.dry_run = true,
            "--stats" => options.stats = true,
            "--clipboard" => options.clipboard = true,
            "--file" => options.file = Some(next_value(&mut iter, "--file")?),
            "--voice" => options.voice = Some(next_value(&mut iter, "--voice")?),
            "--lang" => options.lang = Some(next_value(&mut iter, "--lang")?),
            "--rate" => options.rate = Some(next_number(&mut iter, "--rate")?),
            "--pitch" => options.pitch = Some(next_number(&mut iter, "--pitch")?),
            "--volume" => options.volume = Some(next_number(&mut iter, "--volume")?),
            "--" => {
                options.text.extend(iter.by_ref().cloned());
            }
            other if other.starts_with('-') && other.len() > 1 => {
                bail!("Unknown option: {}\n\n{}", other, USAGE)
            }
            other => options.text.push(other.to_string()),
        }
    }

    Ok(options)
}

fn next_value<'a>(iter: &mut impl Iterator<Item = &'a String>, name: &str) -> anyhow::Result<String> {
    iter.next()
        .cloned()
        .with_context(|| format!("{} needs a value", name))
}

fn next_number<'a>(iter: &mut impl Iterator<Item = &'a String>, name: &str) -> anyhow::Result<f32> {
    let raw = next_value(iter, name)?;
    raw.trim()
        .parse()
        .with_context(|| format!("{} expects a number, got '{}'", name, raw))
}

fn run(args: &[String]) -> anyhow::Result<()> {
    let options = parse_args(args)?;
    if options.help {
        print!("{}", USAGE);
        return Ok(());
    }
    debug!("Options: {:?}", options);

    let (config, engine) = if options.dry_run {
        info!("Dry run: using the in-memory engine");
        let engine: Box<dyn SpeechEngine> =
            Box::new(MemoryEngine::new(MemoryEngine::sample_voices()).auto_play(true));
        (Config::in_memory(), engine)
    } else {
        let config = Config::load().context("Failed to load configuration")?;
        let engine = create_engine(config.settings().provider)?;
        (config, engine)
    };
    info!("Speech engine: {}", engine.name());

    let mut state = State::with_engine(config, engine, Instant::now());
    apply_settings(&mut state, &options);
    wait_for_voices(&mut state);

    if let Some(query) = &options.voice {
        state.select_voice(query)?;
    }

    if options.list_voices {
        let tiers = state.tiers();
        if options.json {
            println!("{}", serde_json::to_string_pretty(&tiers)?);
        } else {
            print_tiers(&tiers, &state.settings().language, state.voices().len());
        }
        return Ok(());
    }

    let text = read_text(&options)?;
    if options.interactive {
        interactive(&mut state, &text)?;
    } else {
        speak_once(&mut state, &text)?;
    }

    if options.stats {
        let stats = state.statistics();
        println!(
            "Spoken {} utterance(s), {} character(s)",
            stats.utterances, stats.characters
        );
    }
    Ok(())
}

/// Command line overrides on top of the configured settings
fn apply_settings(state: &mut State, options: &Options) {
    let mut settings = state.settings().clone();
    if let Some(lang) = &options.lang {
        settings.language = lang.clone();
    }
    if let Some(rate) = options.rate {
        settings.rate = rate;
    }
    if let Some(pitch) = options.pitch {
        settings.pitch = pitch;
    }
    if let Some(volume) = options.volume {
        settings.volume = volume;
    }
    state.update_settings(settings);
}

fn wait_for_voices(state: &mut State) {
    let deadline = Instant::now() + VOICE_WAIT;
    while state.voice_status() == LoadStatus::Pending && Instant::now() < deadline {
        state.pump(Instant::now());
        std::thread::sleep(Duration::from_millis(20));
    }

    match state.voice_status() {
        LoadStatus::Loaded(count) => info!("{} voices available", count),
        _ => warn!("No voices reported yet; the engine's default voice will be used"),
    }
}

fn print_tiers(tiers: &Tiers, language: &str, total: usize) {
    if total == 0 {
        println!("No voices available. Speech may not be supported on this system.");
        return;
    }

    println!("Voices for {} ({} total):", language, total);
    let groups: [(&str, &Vec<Voice>); 3] = [
        ("Primary", &tiers.primary),
        ("Secondary", &tiers.secondary),
        ("Fallback", &tiers.fallback),
    ];
    for (label, tier) in groups {
        if tier.is_empty() {
            continue;
        }
        println!("{}:", label);
        for voice in tier {
            println!(
                "  {}  [{:?}, {:?}, {:?}]",
                voice, voice.gender, voice.accent, voice.quality
            );
        }
    }
    if tiers.is_empty() {
        println!("No voices match {}.", language);
    }
}

fn read_text(options: &Options) -> anyhow::Result<String> {
    if let Some(path) = &options.file {
        return std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path));
    }
    if options.clipboard {
        return Ok(get_from_clipboard()?);
    }
    if !options.text.is_empty() {
        return Ok(options.text.join(" "));
    }
    if !options.interactive && !is_tty(io::stdin().as_raw_fd()) {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    Ok(String::new())
}

/// Status display state fed by session events
#[derive(Default)]
struct StatusView {
    highlighted: Option<usize>,
    percent: f32,
}

impl StatusView {
    /// Returns whether the line needs redrawing
    fn apply(&mut self, event: &SessionEvent) -> bool {
        match event {
            SessionEvent::Started(_) => {
                *self = Self::default();
                true
            }
            SessionEvent::Word { index, .. } => {
                self.highlighted = Some(*index);
                true
            }
            SessionEvent::Progress { percent, .. } => {
                self.percent = *percent;
                true
            }
            _ => false,
        }
    }

    fn draw(&self, text: &str, width: usize) {
        eprint!(
            "\r\x1b[K{}",
            status_line(text, self.highlighted, self.percent, width)
        );
        let _ = io::stderr().flush();
    }
}

fn speak_once(state: &mut State, text: &str) -> anyhow::Result<()> {
    let stderr_fd = io::stderr().as_raw_fd();
    let show_status = is_tty(stderr_fd);
    let (width, _) = get_terminal_size(stderr_fd);

    let id = state.speak(text, Instant::now())?;
    let timeout = estimate_duration(text.chars().count(), state.settings().rate) * 3
        + Duration::from_secs(30);

    let mut view = StatusView::default();
    let outcome = state.wait(id, timeout, |event| {
        if view.apply(event) && show_status {
            view.draw(text, width as usize);
        }
    });
    if show_status {
        eprintln!();
    }

    match outcome {
        Ok(SessionOutcome::Completed) => info!("Finished speaking"),
        Ok(_) => warn!("Speech stopped before the end"),
        Err(e) if !e.is_user_facing() => debug!("Speech interrupted: {}", e),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn interactive(state: &mut State, text: &str) -> anyhow::Result<()> {
    let stdin_fd = io::stdin().as_raw_fd();
    if !is_tty(stdin_fd) {
        bail!("Interactive mode requires a terminal on stdin");
    }

    let keymap = create_default_keymap();
    info!("Key handler initialized with {} bindings", keymap.len());
    let mut onboarding_pending = !state.config.onboarding_shown();
    if onboarding_pending {
        println!("{}", SHORTCUT_HELP);
    }

    let (width, _) = get_terminal_size(stdin_fd);
    let width = width as usize;
    let _guard = RawModeGuard::new(stdin_fd)?;

    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(16);
    poll.registry().register(
        &mut mio::unix::SourceFd(&stdin_fd),
        STDIN,
        Interest::READABLE,
    )?;

    let mut view = StatusView::default();
    let mut buf = [0u8; 256];

    loop {
        let now = Instant::now();
        let timeout = state
            .next_deadline()
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(Duration::from_millis(100))
            .min(Duration::from_millis(100));

        if let Err(e) = poll.poll(&mut events, Some(timeout)) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e.into());
        }

        let mut input = Vec::new();
        for event in events.iter() {
            if event.token() == STDIN {
                let n = io::stdin().read(&mut buf)?;
                if n == 0 {
                    state.stop(Instant::now());
                    return Ok(());
                }
                input.extend_from_slice(&buf[..n]);
            }
        }

        if !input.is_empty() {
            let now = Instant::now();
            state.user_gesture(now);
            if onboarding_pending {
                onboarding_pending = false;
                if let Err(e) = state.config.mark_onboarding_shown() {
                    warn!("Failed to save onboarding flag: {}", e);
                }
            }

            for shortcut in parse_input(&keymap, &input) {
                debug!("Shortcut {:?}", shortcut);
                let result = match shortcut {
                    Shortcut::Quit => {
                        state.stop(now);
                        eprint!("\r\n");
                        return Ok(());
                    }
                    Shortcut::Speak => state.speak(text, now).map(|_| ()),
                    Shortcut::Stop => {
                        state.stop(now);
                        Ok(())
                    }
                    Shortcut::TogglePause => state.toggle_pause(now),
                    Shortcut::RefreshVoices => {
                        state.reload_voices(now);
                        message(&format!("{} voices available", state.voices().len()));
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    if e.is_user_facing() {
                        message(&e.to_string());
                    }
                }
            }
        }

        for event in state.pump(Instant::now()) {
            match &event {
                SessionEvent::Failed { error, .. } => message(error.user_message()),
                SessionEvent::StateChanged(SessionState::Paused) => {
                    view.draw(text, width);
                    eprint!(" (paused)");
                }
                SessionEvent::Finished(_) => {
                    view.apply(&event);
                    view.draw(text, width);
                    eprint!("\r\n");
                }
                SessionEvent::Cancelled(_) => message("Stopped"),
                _ => {
                    if view.apply(&event) {
                        view.draw(text, width);
                    }
                }
            }
        }
    }
}

/// Print a line of feedback below the status line
fn message(text: &str) {
    eprint!("\r\x1b[K{}\r\n", text);
    let _ = io::stderr().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let options = parse_args(&args(&["--rate", "1.5", "--lang", "si-LK", "hello", "world"]))
            .unwrap();
        assert_eq!(options.rate, Some(1.5));
        assert_eq!(options.lang.as_deref(), Some("si-LK"));
        assert_eq!(options.text, vec!["hello", "world"]);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&args(&["--rate"])).is_err());
        assert!(parse_args(&args(&["--rate", "fast"])).is_err());
        assert!(parse_args(&args(&["--bogus"])).is_err());
        let options = parse_args(&args(&["--", "-not-an-option"])).unwrap();
        assert_eq!(options.text, vec!["-not-an-option"]);
    }
}

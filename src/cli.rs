use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::time::Instant;

use quiz_night::api::{HttpApi, TriviaApi};
use quiz_night::config::{Config, ExpiryPolicy, Roster};
use quiz_night::model::types::{AnswerIndex, RevealStage};
use quiz_night::polling::{InputState, PollPhase, PollView, PollingController};
use quiz_night::reveal::{AnswerMark, RevealController};
use quiz_night::scheduler::Scheduler;
use quiz_night::session::{CookieStore, FileCookieStore, Session};

#[derive(Parser, Debug)]
#[command(name = "quiz-night")]
#[command(about = "Play along with, or host the reveal of, a pairs trivia night")]
pub struct Args {
    /// Quiz API base URL [env: QUIZ_API_BASE]
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// File holding the stored identity and progress [env: QUIZ_SESSION_FILE]
    #[arg(long, global = true)]
    pub session_file: Option<PathBuf>,

    /// Milliseconds between polls [env: QUIZ_POLL_INTERVAL_MS]
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: Option<u64>,

    /// Seconds to answer a question [env: QUIZ_COUNTDOWN_SECS]
    #[arg(long, global = true)]
    pub countdown_secs: Option<u64>,

    /// Questions each pair answered [env: QUIZ_QUESTIONS_PER_PAIR]
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    pub questions_per_pair: Option<u32>,

    /// What happens when time runs out: `hold` or `forfeit:<seconds>` [env: QUIZ_EXPIRY_POLICY]
    #[arg(long, global = true)]
    pub expiry: Option<ExpiryPolicy>,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Lay the flags that were given over settings read from the environment.
    pub fn apply(&self, config: &mut Config) {
        if let Some(api_base) = &self.api_base {
            config.api_base = api_base.clone();
        }
        if let Some(session_file) = &self.session_file {
            config.session_file = session_file.clone();
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll.interval = Duration::from_millis(ms);
        }
        if let Some(secs) = self.countdown_secs {
            config.poll.countdown = Duration::from_secs(secs);
        }
        if let Some(questions) = self.questions_per_pair {
            config.questions_per_pair = questions;
        }
        if let Some(expiry) = self.expiry {
            config.poll.expiry = expiry;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Swap an access code for your member, team and teammate
    Redeem { code: String },
    /// Wait for questions and answer them by typing 1-4
    Play,
    /// Step through every pair's answers as the host
    Reveal {
        /// JSON file listing the pairs, e.g. [{"member":"A","teammate":"B"}]
        #[arg(long)]
        pairs: PathBuf,
    },
    /// Give the next unassigned member a team
    Draw,
    /// List the teams and their players
    Teams,
    /// Forget the stored identity and progress
    Forget,
}

fn build_api(config: &Config) -> Result<Arc<dyn TriviaApi>> {
    let api = HttpApi::new(&config.api_base, config.request_timeout)
        .with_context(|| format!("Invalid API base {}", config.api_base))?
        .with_api_key(config.api_key.clone());
    debug!("Using API at {}", api.base());
    Ok(Arc::new(api))
}

fn open_store(config: &Config) -> Result<Arc<dyn CookieStore>> {
    let store = FileCookieStore::open(&config.session_file).with_context(|| {
        format!("Couldn't open session file {}", config.session_file.display())
    })?;
    debug!("Session stored in {}", store.path().display());
    Ok(Arc::new(store))
}

pub async fn run(args: Args, mut config: Config) -> Result<()> {
    args.apply(&mut config);
    match args.command {
        Command::Redeem { code } => redeem(&config, &code).await,
        Command::Play => play(&config).await,
        Command::Reveal { pairs } => reveal(&config, &pairs).await,
        Command::Draw => draw(&config).await,
        Command::Teams => teams(&config).await,
        Command::Forget => {
            let store = open_store(&config)?;
            Session::clear(store.as_ref())?;
            println!("Forgot the stored identity");
            Ok(())
        }
    }
}

async fn redeem(config: &Config, code: &str) -> Result<()> {
    let api = build_api(config)?;
    let store = open_store(config)?;
    let identity = api
        .redeem_code(code.trim())
        .await
        .context("Couldn't redeem the access code")?;
    Session::save_identity(store.as_ref(), &identity)?;
    println!(
        "You are {} on team {}, paired with {}",
        identity.member, identity.team, identity.teammate
    );
    Ok(())
}

async fn draw(config: &Config) -> Result<()> {
    let api = build_api(config)?;
    let Some(member) = api.fetch_unassigned_member().await? else {
        println!("Everyone already has a team");
        return Ok(());
    };
    match api.assign_member(&member).await? {
        Some(team) => println!("{member} joins team {team}"),
        None => println!("{member} was assigned"),
    }
    Ok(())
}

async fn teams(config: &Config) -> Result<()> {
    let api = build_api(config)?;
    for team in api.fetch_teams().await? {
        println!("{}: {}", team.team_name, team.players.join(", "));
    }
    Ok(())
}

fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

// === Player ===

fn render_poll(view: &PollView) {
    if let Some(error) = &view.error {
        println!("! {error}");
    }
    match &view.phase {
        PollPhase::Idle => println!("Waiting for the next question..."),
        PollPhase::Showing(shown) => {
            let question = &shown.question;
            println!();
            println!("Question {}: {}", question.question_number, question.text);
            for index in AnswerIndex::ALL {
                println!("  {index}. {}", question.answer(index));
            }
            match shown.input {
                InputState::Open => {
                    println!("Type 1-4 to answer");
                    render_countdown(view);
                }
                InputState::Expired => println!("Time is up"),
            }
        }
    }
}

const BAR_WIDTH: usize = 20;

/// `[#####-----]`, filled in proportion to `fraction` (0.0 to 1.0).
fn pressure_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

/// Redraw the countdown line in place while an open question is shown.
fn render_countdown(view: &PollView) {
    let Some(shown) = view.shown() else { return };
    if shown.input != InputState::Open {
        return;
    }
    let now = Instant::now();
    print!(
        "\r{} {:>2}s ",
        pressure_bar(shown.countdown.progress_at(now), BAR_WIDTH),
        shown.countdown.seconds_left_at(now)
    );
    let _ = std::io::stdout().flush();
}

async fn play(config: &Config) -> Result<()> {
    let api = build_api(config)?;
    let session = Arc::new(Session::load(open_store(config)?));
    let mut controller =
        PollingController::new(session, api, Scheduler::current(), config.poll.clone())
            .context("Run `quiz-night redeem <CODE>` first")?;
    let mut views = controller.subscribe();
    controller.start();
    render_poll(&views.borrow_and_update());

    let mut lines = stdin_lines();
    let mut redraw = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = redraw.tick() => render_countdown(&views.borrow()),
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                render_poll(&views.borrow_and_update());
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line == "q" {
                    break;
                }
                let choice = line
                    .parse::<usize>()
                    .ok()
                    .and_then(AnswerIndex::from_one_based);
                match choice {
                    Some(index) => {
                        if let Err(e) = controller.choose(index) {
                            println!("{e}");
                        }
                    }
                    None => println!("Type a number from 1 to 4, or q to quit"),
                }
            }
        }
    }
    controller.stop();
    Ok(())
}

// === Host ===

fn render_reveal(controller: &RevealController) {
    println!();
    if let Some(pair) = controller.pair() {
        println!(
            "{}: {} & {}",
            controller.pair_label(),
            pair.member,
            pair.teammate
        );
    }
    println!("{} - {}", controller.progress_label(), controller.stage().label());
    if let Some(question) = controller.question() {
        println!("{}", question.text);
        for (index, mark) in AnswerIndex::ALL.into_iter().zip(controller.marks()) {
            let tag = match mark {
                AnswerMark::Neutral => "  ",
                AnswerMark::UserPick => "->",
                AnswerMark::Correct => "OK",
                AnswerMark::WrongPick => "XX",
            };
            println!("{tag} {index}. {}", question.answer(index));
        }
        if controller.stage() >= RevealStage::UserAnswer && controller.user_pick().is_none() {
            println!("(no pick recorded)");
        }
    }
    if let Some(error) = controller.error() {
        println!("! {error} (r to retry)");
    }
    println!(
        "[Enter/n] {}  [b] back  [r] retry  [j <pair> <question>] jump  [q] quit",
        controller.advance_label()
    );
}

async fn reveal(config: &Config, pairs: &Path) -> Result<()> {
    let roster = Roster::load(pairs)?;
    let mut controller = RevealController::new(build_api(config)?, roster, config.questions_per_pair)?;
    controller.start().await;
    render_reveal(&controller);

    let mut lines = stdin_lines();
    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        match words.next() {
            None | Some("n") => controller.advance().await,
            Some("b") => controller.retreat(),
            Some("r") => controller.retry().await,
            Some("j") => {
                let pair = words.next().and_then(|w| w.parse::<usize>().ok());
                let question = words.next().and_then(|w| w.parse::<u32>().ok());
                match (pair, question) {
                    (Some(pair), Some(question)) if pair > 0 => {
                        if let Err(e) = controller.jump_to(pair - 1, question).await {
                            println!("{e}");
                        }
                    }
                    _ => println!("Usage: j <pair> <question>"),
                }
            }
            Some("q") => break,
            Some(other) => println!("Unknown command {other}"),
        }
        render_reveal(&controller);
    }
    Ok(())
}

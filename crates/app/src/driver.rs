//! Line-oriented terminal front end over the navigation controller.

use std::fmt;

use learn_core::model::{Cursor, QuestionState, Section};
use services::{LearningEvent, NavState, NavigationController, NavigationError, NextOutcome, QuizAdvance};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::Receiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Next,
    Prev,
    GoTo(Cursor),
    Select(usize),
    Validate,
    Advance,
    Abort { confirmed: bool },
    Status,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CommandError {
    Unknown(String),
    BadArgument { command: &'static str, raw: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Unknown(raw) => write!(f, "unknown command: {raw} (try `help`)"),
            CommandError::BadArgument { command, raw } => {
                write!(f, "invalid argument for {command}: {raw:?}")
            }
        }
    }
}

impl std::error::Error for CommandError {}

fn index_arg(command: &'static str, raw: Option<&str>) -> Result<usize, CommandError> {
    let raw = raw.unwrap_or_default();
    raw.parse().map_err(|_| CommandError::BadArgument {
        command,
        raw: raw.to_string(),
    })
}

/// Parse one input line. Empty lines are `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let command = match head {
        "next" | "n" => Command::Next,
        "prev" | "p" => Command::Prev,
        "goto" => {
            let chapter = index_arg("goto", words.next())?;
            let topic = index_arg("goto", words.next())?;
            Command::GoTo(Cursor::new(chapter, topic))
        }
        "select" | "s" => Command::Select(index_arg("select", words.next())?),
        "validate" | "v" => Command::Validate,
        "advance" | "a" => Command::Advance,
        "abort" => Command::Abort {
            confirmed: matches!(words.next(), Some("yes" | "y")),
        },
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn print_help() {
    println!("commands:");
    println!("  next | prev | goto <chapter> <topic>");
    println!("  select <option> | validate | advance | abort yes");
    println!("  status | help | quit");
}

fn print_topic(nav: &NavigationController) {
    let cursor = nav.cursor();
    let Some(topic) = nav.current_topic() else {
        return;
    };
    let chapter = nav
        .curriculum()
        .chapter_at(cursor.chapter_index)
        .map(|c| c.title().to_owned())
        .unwrap_or_default();
    let status = nav.topic_status(cursor.chapter_index, cursor.topic_index);
    let mark = if status.completed { " [passed]" } else { "" };
    println!();
    println!("== {chapter} / {}{mark} ({cursor})", topic.title());
    let content = topic.content();
    if !content.description.is_empty() {
        println!("{}", content.description);
    }
    for section in &content.sections {
        match section {
            Section::Text { value } => println!("{value}"),
            Section::Code { code } => {
                for line in code.lines() {
                    println!("    {line}");
                }
            }
        }
    }
}

fn print_question(nav: &NavigationController) {
    let Some(quiz) = nav.quiz() else {
        return;
    };
    let Some(current) = quiz.current_question() else {
        return;
    };
    let selected = match quiz.state() {
        QuestionState::Selected(i) => Some(*i),
        QuestionState::Revealed(feedback) => Some(feedback.selected),
        QuestionState::Unanswered => None,
    };
    println!();
    println!(
        "Quiz: {} ({}/{})",
        quiz.return_to().chapter_title,
        quiz.question_index() + 1,
        quiz.total()
    );
    println!("{}", current.question.prompt());
    for (i, option) in current.question.options().iter().enumerate() {
        let pointer = if selected == Some(i) { ">" } else { " " };
        println!(" {pointer} {i}. {option}");
    }
}

fn print_status(nav: &NavigationController) {
    let mastery = nav.mastery();
    let state = match nav.state() {
        NavState::Viewing(cursor) => format!("viewing {cursor}"),
        NavState::AwaitingQuiz { return_to } => format!("quiz for chapter {}", return_to.chapter_index),
        NavState::Completed(_) => "course completed".to_string(),
    };
    println!(
        "{} | {state} | modules {} | progress {}% | accuracy {}%",
        nav.curriculum().course().topic_name(),
        mastery.modules_label(),
        mastery.progress_percent,
        mastery.accuracy_percent
    );
}

fn drain_events(events: &mut Receiver<LearningEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            LearningEvent::Degraded { operation } => {
                println!("(offline: {operation} will sync later)");
            }
            LearningEvent::AuthExpired => println!("(session expired: sign in again)"),
            LearningEvent::CourseCompleted => println!("Course complete. Certificate unlocked."),
            _ => {}
        }
    }
}

async fn apply(nav: &mut NavigationController, command: Command) -> Result<(), NavigationError> {
    match command {
        Command::Next => match nav.next().await? {
            NextOutcome::Advanced(_) => print_topic(nav),
            NextOutcome::QuizOpened { .. } => print_question(nav),
            NextOutcome::EndOfCourse => println!("End of course. Pass the remaining quizzes to finish."),
            NextOutcome::CourseCompleted | NextOutcome::Redirect(_) => print_status(nav),
        },
        Command::Prev => {
            nav.prev()?;
            print_topic(nav);
        }
        Command::GoTo(cursor) => {
            nav.go_to(cursor)?;
            print_topic(nav);
        }
        Command::Select(option) => {
            nav.select_option(option).await?;
            print_question(nav);
        }
        Command::Validate => {
            let feedback = nav.validate_answer().await?;
            if feedback.is_correct {
                println!("Correct.");
            } else {
                println!("Not quite. Answer: {}", feedback.correct_option);
            }
            if let Some(explanation) = feedback.explanation {
                println!("{explanation}");
            }
        }
        Command::Advance => match nav.advance_quiz().await? {
            QuizAdvance::NextQuestion { .. } => print_question(nav),
            QuizAdvance::Passed { .. } => {
                println!("Chapter quiz passed.");
                print_topic(nav);
            }
        },
        Command::Abort { confirmed } => {
            if !confirmed {
                println!("type `abort yes` to leave the quiz without saving");
                return Ok(());
            }
            nav.abort_quiz(true).await?;
            print_topic(nav);
        }
        Command::Status => print_status(nav),
        Command::Help => print_help(),
        Command::Quit => {}
    }
    Ok(())
}

/// Read commands from stdin until `quit` or end of input.
///
/// # Errors
///
/// Returns an error if stdin fails, or when the service rejects the
/// credentials and the session cannot continue.
pub async fn run(mut nav: NavigationController) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = nav.subscribe();
    print_status(&nav);
    if nav.quiz().is_some() {
        print_question(&nav);
    } else {
        print_topic(&nav);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        let result = apply(&mut nav, command).await;
        drain_events(&mut events);
        match result {
            Ok(()) => {}
            Err(err) if err.is_auth_expired() => return Err(err.into()),
            Err(err) => println!("{err}"),
        }
    }

    if !nav.flush_reports().await {
        tracing::warn!("some answer reports were not delivered");
    }
    Ok(())
}

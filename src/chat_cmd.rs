//! `docchat chat`: interactive question answering in the terminal.
//!
//! Processes the given files once, then reads one question per line:
//!
//! | Input | Effect |
//! |-------|--------|
//! | any text | ask it; the reply is printed as an `Assistant:` turn |
//! | `/reset` | process the same files again (fresh index, empty history) |
//! | `/quit`, EOF | exit |

use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::error::DocChatError;
use crate::models::UploadedFile;
use crate::session::{Pipeline, ProcessReport, Session};

pub const MISSING_KEY_PROMPT: &str = "Supply an OpenAI key (--api-key or OPENAI_API_KEY) to continue.";

pub async fn run_chat(config: Config, paths: &[PathBuf], api_key: Option<String>) -> Result<()> {
    let files = paths
        .iter()
        .map(|p| UploadedFile::from_path(p))
        .collect::<Result<Vec<_>>>()?;
    let pipeline = Pipeline::from_config(config)?;

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    repl(&pipeline, files, api_key.as_deref(), stdin, &mut stdout).await
}

/// Drive one session from `input`, writing every turn to `out`.
pub async fn repl<R, W>(
    pipeline: &Pipeline,
    files: Vec<UploadedFile>,
    api_key: Option<&str>,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut session = Session::new();
    let report = process(&mut session, pipeline, &files, api_key).await?;
    print_report(out, &report)?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                let report = process(&mut session, pipeline, &files, api_key).await?;
                print_report(out, &report)?;
                continue;
            }
            _ => {}
        }

        writeln!(out, "You: {}", line)?;
        match session.ask(line).await {
            Ok(answer) => writeln!(out, "Assistant: {}", answer.answer)?,
            Err(e) => writeln!(out, "error: {}", e)?,
        }
        out.flush()?;
    }
    Ok(())
}

async fn process(
    session: &mut Session,
    pipeline: &Pipeline,
    files: &[UploadedFile],
    api_key: Option<&str>,
) -> Result<ProcessReport> {
    session
        .process(pipeline, files.to_vec(), api_key)
        .await
        .map_err(|e| match e {
            DocChatError::MissingCredential => anyhow!(MISSING_KEY_PROMPT),
            other => anyhow!(other),
        })
}

fn print_report<W: Write>(out: &mut W, report: &ProcessReport) -> Result<()> {
    writeln!(
        out,
        "Processed {} file(s): {} characters in {} chunks. Ask a question (/reset, /quit).",
        report.files, report.characters, report.chunks
    )?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatCompletion, ChatModel, PromptMessage};
    use crate::embedding::HashEmbedder;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct CountingChat;

    #[async_trait]
    impl ChatModel for CountingChat {
        fn model_name(&self) -> &str {
            "counting"
        }
        async fn complete(
            &self,
            _credential: &str,
            messages: &[PromptMessage],
        ) -> crate::error::Result<ChatCompletion> {
            Ok(ChatCompletion {
                content: format!("{} messages", messages.len()),
                usage: None,
            })
        }
    }

    fn pipeline(api_key: Option<&str>) -> Pipeline {
        let mut config = Config::default();
        config.chat.api_key = api_key.map(str::to_string);
        config.chat.condense_question = false;
        Pipeline::new(config, Arc::new(HashEmbedder::default()), Arc::new(CountingChat))
    }

    fn files() -> Vec<UploadedFile> {
        vec![UploadedFile::new("prices.csv", b"widget,4.99\ngadget,12.50".to_vec())]
    }

    #[tokio::test]
    async fn questions_are_answered_in_turn() {
        let mut out = Vec::new();
        let input = "What does a widget cost?\n\nAnd a gadget?\n/quit\nignored\n".as_bytes();
        repl(&pipeline(Some("sk-test")), files(), None, input, &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Processed 1 file(s)"));
        assert!(text.contains("You: What does a widget cost?\nAssistant: 2 messages"));
        // system + first exchange + question
        assert!(text.contains("You: And a gadget?\nAssistant: 4 messages"));
        assert!(!text.contains("ignored"));
    }

    #[tokio::test]
    async fn reset_starts_a_fresh_history() {
        let mut out = Vec::new();
        let input = "first?\n/reset\nsecond?\n".as_bytes();
        repl(&pipeline(Some("sk-test")), files(), None, input, &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Processed 1 file(s)").count(), 2);
        assert!(text.contains("You: second?\nAssistant: 2 messages"));
    }

    #[tokio::test]
    async fn explicit_key_wins_over_missing_config() {
        let mut out = Vec::new();
        repl(&pipeline(None), files(), Some("sk-flag"), "".as_bytes(), &mut out)
            .await
            .unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("Processed"));
    }
}

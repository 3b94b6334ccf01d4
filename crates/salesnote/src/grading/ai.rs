//! Grading through an external text generator.
//!
//! The generator receives a system prompt with the grading rubric and a
//! user prompt describing the customer's activity, and answers with a JSON
//! object. Any backend works as long as it implements [`TextGenerator`];
//! [`CommandGenerator`] shells out to a configured program.

use std::process::Stdio;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{GradeFactors, GradeResult, Grader};
use crate::config::GradingConfig;
use crate::error::{Error, Result};
use crate::model::{format_won, Company, Customer, Grade};

/// Rubric sent as the system prompt.
pub const GRADE_SYSTEM_PROMPT: &str = "\
You grade B2B customers of a laboratory equipment supplier.

Grades by score:
- A+ (90-100): frequent large purchases and active engagement
- A (80-89): regular purchases and good engagement
- B (60-79): occasional purchases or promising open deals
- C (40-59): little recent activity
- D (0-39): no meaningful activity

A customer with any purchase history is never graded below C.

Answer with a single JSON object and nothing else:
{\"grade\": \"A+|A|B|C|D\", \"score\": 0-100, \"reasoning\": \"...\",
 \"factors\": {\"engagement\": 0-100, \"purchase_potential\": 0-100,
 \"relationship\": 0-100, \"responsiveness\": 0-100},
 \"recommendations\": [\"...\"]}";

/// A backend that turns a prompt into text.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for the given prompts.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or produces no output.
    async fn generate(&self, system: &str, user: &str) -> Result<String>;
}

/// Runs a program with the prompts as JSON on stdin and reads the answer
/// from stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    /// Generator running `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Generator from the grading settings, if a command is configured.
    #[must_use]
    pub fn from_config(config: &GradingConfig) -> Option<Self> {
        config
            .ai_command
            .as_ref()
            .map(|program| Self::new(program.clone(), config.ai_args.clone()))
    }
}

#[async_trait::async_trait]
impl TextGenerator for CommandGenerator {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let request = serde_json::json!({ "system": system, "user": user }).to_string();

        debug!("Running grade generator {}", self.program);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::generator(format!("cannot start {}: {e}", self.program)))?;

        // Feed stdin while stdout drains; the pipe closes when `stdin` drops.
        let stdin = child.stdin.take();
        let feed = async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(request.as_bytes()).await,
                None => Ok(()),
            }
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::generator(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        match fed {
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("{} closed stdin before reading the whole request", self.program);
            }
            other => other?,
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(Error::generator(format!("{} produced no output", self.program)));
        }
        Ok(text)
    }
}

/// Describe a customer and their activity for the generator.
#[must_use]
pub fn build_grade_prompt(
    customer: &Customer,
    company: Option<&Company>,
    activity: &super::CustomerActivity,
) -> String {
    let mut prompt = format!(
        "Customer: {}\nCompany: {}\n",
        customer.display_name(),
        company.map_or("unknown", |c| c.name.as_str())
    );
    if let Some(previous) = customer.grade {
        prompt.push_str(&format!("Previous grade: {previous}\n"));
    }

    prompt.push_str(&format!(
        "\nLast {} days:\n- meetings: {}\n- quotes: {}\n- purchases: {} ({} won)\n",
        activity.window_days,
        activity.meetings,
        activity.quotes,
        activity.recent_purchases,
        format_won(activity.recent_purchase_total)
    ));
    prompt.push_str(&format!(
        "\nAll time:\n- purchases: {} ({} won)\n- last contact: {}\n",
        activity.purchases,
        format_won(activity.total_purchase),
        activity
            .last_contact
            .map_or_else(|| "never".to_string(), |d| d.to_string())
    ));

    if activity.open_opportunities.is_empty() {
        prompt.push_str("\nNo open opportunities.\n");
    } else {
        prompt.push_str("\nOpen opportunities:\n");
        for deal in &activity.open_opportunities {
            prompt.push_str(&format!(
                "- {} [{}] {} won at {}%\n",
                deal.title.as_deref().unwrap_or("untitled"),
                deal.stage.info().display_name,
                format_won(deal.expected_revenue),
                deal.probability
            ));
        }
    }
    prompt
}

#[derive(Debug, Deserialize)]
struct RawFactors {
    #[serde(default)]
    engagement: i64,
    #[serde(default)]
    purchase_potential: i64,
    #[serde(default)]
    relationship: i64,
    #[serde(default)]
    responsiveness: i64,
}

#[derive(Debug, Deserialize)]
struct RawGrade {
    grade: String,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    factors: Option<RawFactors>,
    #[serde(default)]
    recommendations: Vec<String>,
}

fn clamp_percent(value: i64) -> u8 {
    u8::try_from(value.clamp(0, 100)).unwrap_or(0)
}

/// Strip Markdown code fences and any prose around the JSON object.
fn json_body(text: &str) -> &str {
    let text = text.trim();
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Parse a generator answer into a grade.
///
/// Scores and factors are clamped to 0..=100. A missing score falls back to
/// the bottom of the grade's band.
///
/// # Errors
///
/// Returns a generator error if the answer is not JSON or names an unknown
/// grade.
pub fn parse_grade_response(text: &str) -> Result<GradeResult> {
    let raw: RawGrade = serde_json::from_str(json_body(text))
        .map_err(|e| Error::generator(format!("unreadable grade response: {e}")))?;
    let grade: Grade = raw
        .grade
        .parse()
        .map_err(|_| Error::generator(format!("unknown grade {:?}", raw.grade)))?;

    let score = raw.score.map_or_else(
        || match grade {
            Grade::APlus => 90,
            Grade::A => 80,
            Grade::B => 60,
            Grade::C => 40,
            Grade::D => 0,
        },
        clamp_percent,
    );
    let factors = raw.factors.map_or_else(GradeFactors::default, |f| GradeFactors {
        engagement: clamp_percent(f.engagement),
        purchase_potential: clamp_percent(f.purchase_potential),
        relationship: clamp_percent(f.relationship),
        responsiveness: clamp_percent(f.responsiveness),
    });

    Ok(GradeResult {
        grade,
        score,
        reasoning: raw.reasoning.trim().to_string(),
        factors,
        recommendations: raw
            .recommendations
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect(),
    })
}

impl Grader<'_> {
    /// Grade a customer with `generator` and store the result.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown customer, or a generator error when
    /// the backend fails or answers with something unusable.
    pub async fn grade_with_ai(
        &self,
        customer_id: i64,
        generator: &dyn TextGenerator,
    ) -> Result<GradeResult> {
        let customer = self.storage().require_customer(customer_id)?;
        let company = self.storage().get_company(customer.company_id)?;
        let activity = self.collect_activity(customer.id)?;

        let prompt = build_grade_prompt(&customer, company.as_ref(), &activity);
        let answer = generator.generate(GRADE_SYSTEM_PROMPT, &prompt).await?;
        let mut result = parse_grade_response(&answer)?;

        if activity.has_purchases() && result.grade > Grade::C {
            warn!(
                "Generator graded paying customer {} as {}, raising to C",
                customer.id, result.grade
            );
        }
        result.apply_purchase_floor(activity.has_purchases());

        self.store(&customer, &result)?;
        Ok(result)
    }
}

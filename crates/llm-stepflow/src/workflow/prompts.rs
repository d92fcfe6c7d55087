//! Prompt definitions for engine-to-agent interactions.
//!
//! Each request is a serializable struct rendered through a minijinja
//! template, so the prompt text lives next to the data it needs.

use crate::prompt::PromptError;
use minijinja::Environment;
use serde::Serialize;

/// A request that renders itself into prompt text.
pub(crate) trait ToPrompt: Serialize {
    const TEMPLATE: &'static str;

    fn to_prompt(&self) -> Result<String, PromptError> {
        let env = Environment::new();
        let tmpl = env.template_from_str(Self::TEMPLATE)?;
        Ok(tmpl.render(self)?.trim().to_string())
    }
}

/// Formats a score with two decimals for display in prompts.
pub(crate) fn format_score(score: f64) -> String {
    format!("{:.2}", score)
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DependencyOutput {
    pub name: String,
    pub output: String,
}

/// Build phase: base prompt plus dependency context and discussion.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ExecutionRequest {
    pub base_prompt: String,
    pub dependencies: Vec<DependencyOutput>,
    pub by_reference: bool,
    pub discussion: Vec<String>,
}

impl ToPrompt for ExecutionRequest {
    const TEMPLATE: &'static str = r##"
{{ base_prompt }}
{% if dependencies %}
## Context From Completed Steps
{% if by_reference %}
The outputs of the following steps are already part of our conversation. Build on them directly:
{% for dep in dependencies %}- {{ dep.name }}
{% endfor %}
{% else %}
{% for dep in dependencies %}
### {{ dep.name }}
{{ dep.output }}
{% endfor %}
{% endif %}
{% endif %}
{% if discussion %}
## Discussion Notes
{% for note in discussion %}- {{ note }}
{% endfor %}
{% endif %}
"##;
}

/// Retry after a low quality score.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RetryRequest {
    pub original_prompt: String,
    pub attempt: u32,
    pub score: String,
    pub feedback: String,
    pub issues: Vec<String>,
    pub previous_output: String,
}

impl ToPrompt for RetryRequest {
    const TEMPLATE: &'static str = r##"
{{ original_prompt }}

---

## Previous Attempt (attempt {{ attempt }})
**Quality score**: {{ score }}
**Feedback**: {{ feedback }}
{% if issues %}
**Issues**:
{% for issue in issues %}- {{ issue }}
{% endfor %}
{% endif %}
### Previous Output
{{ previous_output }}

---

## Refinement Instructions
Produce a complete, improved version of the output above. Address every issue and the feedback,
keep what already works, and return only the revised output.
"##;
}

/// Score phase: ask the agent to grade an output.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScoringRequest {
    pub step_name: String,
    pub task_prompt: String,
    pub output: String,
}

impl ToPrompt for ScoringRequest {
    const TEMPLATE: &'static str = r##"
# Quality Evaluation Task

Evaluate the output produced for the step "{{ step_name }}".

## Task Given
{{ task_prompt }}

## Output To Evaluate
{{ output }}

---

Rate how completely and correctly the output fulfils the task on a scale from 0.0 to 1.0.
Respond with a JSON object of the following shape:

```json
{% raw %}{
  "score": 0.0,
  "feedback": "One paragraph of overall feedback",
  "issues": ["Concrete problem to fix"]
}{% endraw %}
```

**Important:** Return ONLY the JSON object, no additional explanation.
"##;
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SynthesisEntry {
    pub name: String,
    pub score: String,
    pub output: String,
}

/// Cross-step analysis over one batch of successful outputs.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SynthesisRequest {
    pub entries: Vec<SynthesisEntry>,
}

impl ToPrompt for SynthesisRequest {
    const TEMPLATE: &'static str = r##"
# Cross-Step Synthesis Task

The following {{ entries|length }} steps were produced in parallel and must fit together as one body of work.
{% for entry in entries %}
## Step: {{ entry.name }} (quality {{ entry.score }})
{{ entry.output }}
{% endfor %}
---

Identify conflicts between steps, gaps nothing covers, redundancies, and concrete improvements per step.
Refer to steps by the exact names above. Respond with a JSON object of the following shape:

```json
{% raw %}{
  "conflicts": [{"stepName": "Step name", "issue": "What contradicts what"}],
  "gaps": ["Missing topic"],
  "redundancies": ["Content repeated across steps"],
  "improvements": [{"stepName": "Step name", "suggestion": "Concrete change"}],
  "summary": "Short overall assessment"
}{% endraw %}
```

**Important:** Return ONLY the JSON object, no additional explanation.
"##;
}

/// Single refinement pass driven by synthesis suggestions.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SynthesisRefinementRequest {
    pub original_prompt: String,
    pub previous_output: String,
    pub suggestions: Vec<String>,
}

impl ToPrompt for SynthesisRefinementRequest {
    const TEMPLATE: &'static str = r##"
{{ original_prompt }}

---

## Current Output
{{ previous_output }}

## Suggestions From Cross-Step Review
{% for suggestion in suggestions %}- {{ suggestion }}
{% endfor %}
---

## Refinement Instructions
Revise the current output so it applies the suggestions and stays consistent with the other steps.
Return only the complete revised output.
"##;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps() -> Vec<DependencyOutput> {
        vec![DependencyOutput {
            name: "Outline".to_string(),
            output: "1. Intro 2. Body".to_string(),
        }]
    }

    #[test]
    fn test_execution_inlines_dependency_outputs() {
        let prompt = ExecutionRequest {
            base_prompt: "Write the body.".to_string(),
            dependencies: deps(),
            by_reference: false,
            discussion: vec![],
        }
        .to_prompt()
        .unwrap();

        assert!(prompt.starts_with("Write the body."));
        assert!(prompt.contains("### Outline"));
        assert!(prompt.contains("1. Intro 2. Body"));
        assert!(!prompt.contains("Discussion Notes"));
    }

    #[test]
    fn test_execution_references_dependencies_by_name() {
        let prompt = ExecutionRequest {
            base_prompt: "Write the body.".to_string(),
            dependencies: deps(),
            by_reference: true,
            discussion: vec!["Use a friendly tone".to_string()],
        }
        .to_prompt()
        .unwrap();

        assert!(prompt.contains("- Outline"));
        assert!(!prompt.contains("1. Intro 2. Body"));
        assert!(prompt.contains("## Discussion Notes"));
        assert!(prompt.contains("- Use a friendly tone"));
    }

    #[test]
    fn test_execution_without_context_is_base_prompt() {
        let prompt = ExecutionRequest {
            base_prompt: "Just this.".to_string(),
            dependencies: vec![],
            by_reference: false,
            discussion: vec![],
        }
        .to_prompt()
        .unwrap();
        assert_eq!(prompt, "Just this.");
    }

    #[test]
    fn test_retry_prompt_contains_previous_attempt() {
        let prompt = RetryRequest {
            original_prompt: "Write X.".to_string(),
            attempt: 1,
            score: format_score(0.6),
            feedback: "Too short".to_string(),
            issues: vec!["Missing examples".to_string()],
            previous_output: "X is good.".to_string(),
        }
        .to_prompt()
        .unwrap();

        assert!(prompt.starts_with("Write X."));
        assert!(prompt.contains("**Quality score**: 0.60"));
        assert!(prompt.contains("Too short"));
        assert!(prompt.contains("- Missing examples"));
        assert!(prompt.contains("X is good."));
        assert!(prompt.contains("## Refinement Instructions"));
    }

    #[test]
    fn test_scoring_prompt_keeps_literal_json_shape() {
        let prompt = ScoringRequest {
            step_name: "Intro".to_string(),
            task_prompt: "Write an intro".to_string(),
            output: "Hello".to_string(),
        }
        .to_prompt()
        .unwrap();

        assert!(prompt.contains("\"score\": 0.0"));
        assert!(prompt.contains("\"Intro\""));
        assert!(prompt.contains("Hello"));
    }

    #[test]
    fn test_synthesis_prompt_lists_every_entry() {
        let prompt = SynthesisRequest {
            entries: vec![
                SynthesisEntry {
                    name: "A".to_string(),
                    score: format_score(0.9),
                    output: "alpha".to_string(),
                },
                SynthesisEntry {
                    name: "B".to_string(),
                    score: format_score(0.85),
                    output: "beta".to_string(),
                },
            ],
        }
        .to_prompt()
        .unwrap();

        assert!(prompt.contains("following 2 steps"));
        assert!(prompt.contains("## Step: A (quality 0.90)"));
        assert!(prompt.contains("## Step: B (quality 0.85)"));
        assert!(prompt.contains("\"stepName\""));
    }

    #[test]
    fn test_synthesis_refinement_prompt_bullets_suggestions() {
        let prompt = SynthesisRefinementRequest {
            original_prompt: "Write B.".to_string(),
            previous_output: "beta".to_string(),
            suggestions: vec!["Mention A".to_string(), "Shorten".to_string()],
        }
        .to_prompt()
        .unwrap();

        assert!(prompt.contains("- Mention A"));
        assert!(prompt.contains("- Shorten"));
        assert!(prompt.contains("beta"));
    }
}

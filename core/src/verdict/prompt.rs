use std::fmt::Write;

use crate::ai::truncate_chars;
use crate::config::LlmConfig;
use crate::issue::Issue;
use crate::references::{ReferenceExample, ReferenceLabel};

const CRITERIA: &str = r"# Criteria for Suitability

- Should involve implementing new functionality, features, or algorithms
- Should have clear requirements and goals
- Should be educational and provide learning value
- For bug fixes: should be moderate complexity fixes that provide learning opportunities
  - Acceptable: algorithm bugs, logic errors, performance issues, UI/UX improvements
  - Not acceptable: simple typo fixes, urgent security patches, trivial configuration changes
- Should have complexity similar to the reference examples (if provided)
- Should be challenging but achievable for programming practice
- Should NOT involve cross-platform compatibility issues

# Environment Constraints

- All programming problems will be solved in a fixed Docker environment
- Issues requiring cross-platform compatibility, OS-specific features, or multiple platform support are NOT suitable
- Focus on core functionality, algorithms, and logic rather than platform integration

# Bug Fix Complexity

Suitable: algorithm implementation errors, performance bottlenecks, UI interaction bugs, data structure bugs, moderate refactoring needs
Unsuitable: syntax errors, typos, missing imports, urgent security vulnerabilities, broken builds, simple CSS fixes

# Cross-Platform Exclusions

Not suitable: Windows/Mac/Linux compatibility, browser compatibility, mobile/desktop differences, OS-specific APIs, platform-specific UI, multi-environment deployment
";

fn build_references_section(references: &[ReferenceExample], limit: usize) -> String {
    let mut section = String::new();
    for example in references.iter().take(limit) {
        let verdict = match example.label {
            ReferenceLabel::Suitable => "SUITABLE",
            ReferenceLabel::Unsuitable => "NOT SUITABLE",
        };
        let _ = write!(
            section,
            "### {} ({verdict})\n{}\n\n",
            example.name, example.content
        );
    }
    section
}

/// Build the self-contained judgment prompt for one issue.
pub fn build_suitability_prompt(issue: &Issue, references: &[ReferenceExample], config: &LlmConfig) -> String {
    let mut prompt = String::from(
        "You are an expert evaluator of programming exercises. Decide whether this GitHub issue would be suitable as a programming problem for educational purposes.\n\n",
    );

    let references_section = build_references_section(references, config.max_reference_examples);
    if !references_section.is_empty() {
        let _ = write!(
            prompt,
            "# Reference Examples\n\nUse these as benchmarks for complexity and educational value.\n\n{references_section}"
        );
    }

    prompt.push_str(CRITERIA);

    let labels = if issue.labels.is_empty() {
        "None".to_owned()
    } else {
        issue.label_list().join(", ")
    };
    let body = truncate_chars(&issue.body, config.max_body_chars);
    let ellipsis = if body.len() < issue.body.len() { "..." } else { "" };

    let _ = write!(
        prompt,
        r#"
# Issue

Title: {title}
Labels: {labels}

Description:
{body}{ellipsis}

# Response

Return JSON on its own line:
{{"suitable": true, "reason": "one sentence", "certainty": "low|medium|high"}}"#,
        title = issue.title,
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(name: &str, label: ReferenceLabel) -> ReferenceExample {
        ReferenceExample {
            name: name.to_owned(),
            label,
            content: format!("content of {name}"),
        }
    }

    #[test]
    fn test_prompt_contains_issue_fields() {
        let issue = Issue::new(9, "Implement a trie", "Prefix lookups are slow").with_labels(["enhancement"]);
        let prompt = build_suitability_prompt(&issue, &[], &LlmConfig::default());
        assert!(prompt.contains("Title: Implement a trie"));
        assert!(prompt.contains("Labels: enhancement"));
        assert!(prompt.contains("Prefix lookups are slow"));
        assert!(!prompt.contains("# Reference Examples"));
    }

    #[test]
    fn test_body_is_truncated() {
        let config = LlmConfig {
            max_body_chars: 5,
            ..LlmConfig::default()
        };
        let prompt = build_suitability_prompt(&Issue::new(1, "t", "abcdefghij"), &[], &config);
        assert!(prompt.contains("abcde..."));
        assert!(!prompt.contains("abcdef"));
    }

    #[test]
    fn test_reference_examples_are_capped() {
        let references: Vec<_> = (0..5)
            .map(|i| example(&format!("ref{i}.md"), ReferenceLabel::Suitable))
            .chain([example("bad.md", ReferenceLabel::Unsuitable)])
            .collect();
        let prompt = build_suitability_prompt(&Issue::new(1, "t", ""), &references, &LlmConfig::default());
        assert!(prompt.contains("ref0.md (SUITABLE)"));
        assert!(prompt.contains("ref2.md"));
        assert!(!prompt.contains("ref3.md"));
        assert!(prompt.contains("Labels: None"));
    }
}

//! System prompts for each agent role.
//!
//! The built-in prompts are short role statements. Production prompts are
//! supplied through the `prompts` config table, keyed by stage name.

use std::collections::HashMap;

use reelsmith_core::config::Config;

pub const TREND_ANALYSIS: &str = "Trend_And_Audience_Analysis";
pub const SEO_ANALYSIS: &str = "SEO_Analysis";
pub const CONTENT_STRATEGY: &str = "Content_Strategist_Prompt_Weaver";
pub const RESEARCH_NAVIGATOR: &str = "Research_Navigator";
pub const KNOWLEDGE_CURATOR: &str = "Knowledge_Curator_Fact_Checker";
pub const SCRIPTWRITER: &str = "Final_Script";
pub const GEORGE_BLACKMAN: &str = "GEORGE_BLACKMAN_SCORE";
pub const MR_BEAST: &str = "MR_BEAST_SCORE";
pub const SCRIPT_MODIFICATION: &str = "modify_script";

fn builtin(stage: &str) -> &'static str {
    match stage {
        TREND_ANALYSIS => {
            "You are the Target Audience Trend Alchemist. Find trending YouTube topics for the \
             given subject, study competing videos and channels, and describe the target \
             audience. Propose three idea sets, each with a topic, title and thumbnail concept."
        }
        SEO_ANALYSIS => {
            "You are the SEO Platform Strategist. Validate the proposed topics, titles and \
             thumbnails against search volume and keyword data. Keep keyword lookups to three \
             words or fewer."
        }
        CONTENT_STRATEGY => {
            "You are the Content Strategist Prompt Weaver. Combine the trend and SEO analyses \
             into three final idea sets, ranked, with the reasoning for each."
        }
        RESEARCH_NAVIGATOR => {
            "You are the Research Navigator. Find statistics, studies and examples from \
             reputable scientific sources for the chosen ideas. Cite every source with its DOI \
             or URL."
        }
        KNOWLEDGE_CURATOR => {
            "You are the Knowledge Curator and Fact Checker. Verify the research findings, \
             discard weak sources, save the curated research with its DOIs and index the saved \
             page."
        }
        SCRIPTWRITER => {
            "You are the Lead Scriptwriter and Engagement Maestro. Write a complete YouTube \
             script from the chosen idea and the curated research. Use the knowledge tools for \
             audience, scripting technique and scientific detail, and reference saved research."
        }
        GEORGE_BLACKMAN => {
            "You are George Blackman, a YouTube script consultant. Score the script on hook, \
             story, pacing and payoff. End with a line of the form 'Total GB Score: X/10'."
        }
        MR_BEAST => {
            "You are MrBeast. Score the script on retention, curiosity and re-watchability. \
             End with a line of the form 'Total MB Score: X/10'."
        }
        SCRIPT_MODIFICATION => {
            "You are a script editor. Apply the requested modification to the script and \
             return the full revised script. Search saved research when the change needs new \
             references."
        }
        _ => "You are a helpful assistant.",
    }
}

/// Role prompts with config overrides applied.
#[derive(Debug, Clone, Default)]
pub struct Prompts {
    overrides: HashMap<String, String>,
}

impl Prompts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            overrides: config.prompts.clone(),
        }
    }

    pub fn with_override(mut self, stage: impl Into<String>, prompt: impl Into<String>) -> Self {
        self.overrides.insert(stage.into(), prompt.into());
        self
    }

    pub fn system(&self, stage: &str) -> String {
        self.overrides
            .get(stage)
            .cloned()
            .unwrap_or_else(|| builtin(stage).to_string())
    }
}

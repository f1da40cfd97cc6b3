//! The content workflows and the tool sets of their agent roles.

pub mod ideation;
pub mod modify;
pub mod research;
pub mod scripting;

use reelsmith_tools::ToolSet;
use reelsmith_tools::knowledge::KnowledgeTool;
use reelsmith_tools::literature::{EuropePmcTool, GoogleScholarTool, PubMedTool, SemanticScholarTool};
use reelsmith_tools::notion::{ExtractNotionPageTool, IndexPageTool, SaveInNotionTool, SearchNotionPagesTool};
use reelsmith_tools::search::PerplexitySearchTool;
use reelsmith_tools::youtube::{
    ChannelDetailsTool, KeywordVolumeTool, TranscribeVideoTool, VideoDetailsTool, YouTubeApi,
    YoutubeSearchTool,
};

pub use ideation::ideation_workflow;
pub use modify::modify_script;
pub use research::research_workflow;
pub use scripting::scripting_workflow;

pub fn trend_tools() -> ToolSet {
    let api = YouTubeApi::default();
    ToolSet::new()
        .with(PerplexitySearchTool::default())
        .with(YoutubeSearchTool::new(api.clone()))
        .with(ChannelDetailsTool::new(api.clone()))
        .with(VideoDetailsTool::new(api))
        .with(TranscribeVideoTool::default())
        .with(KnowledgeTool::avatar())
}

pub fn seo_tools() -> ToolSet {
    ToolSet::new().with(KeywordVolumeTool::default())
}

pub fn strategist_tools() -> ToolSet {
    ToolSet::new()
        .with(KnowledgeTool::scripting_brain())
        .with(KnowledgeTool::avatar())
}

pub fn navigator_tools() -> ToolSet {
    ToolSet::new()
        .with(EuropePmcTool::default())
        .with(SemanticScholarTool::default())
        .with(PubMedTool::default())
        .with(GoogleScholarTool::default())
}

pub fn curator_tools() -> ToolSet {
    ToolSet::new()
        .with(PerplexitySearchTool::default())
        .with(SaveInNotionTool)
        .with(IndexPageTool)
}

pub fn scriptwriter_tools() -> ToolSet {
    ToolSet::new()
        .with(KnowledgeTool::avatar())
        .with(KnowledgeTool::ultimate_brain())
        .with(KnowledgeTool::scripting_brain())
        .with(SearchNotionPagesTool)
        .with(ExtractNotionPageTool)
}

pub fn editor_tools() -> ToolSet {
    ToolSet::new()
        .with(SearchNotionPagesTool)
        .with(ExtractNotionPageTool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_tool_sets() {
        assert_eq!(
            trend_tools().names(),
            vec![
                "perplexity_ai_search",
                "youtube_search",
                "channel_details_tool",
                "youtube_video_details",
                "transcribe_video",
                "Avatar"
            ]
        );
        assert_eq!(seo_tools().names(), vec!["google_promise"]);
        assert_eq!(strategist_tools().names(), vec!["scripting_brain", "Avatar"]);
        assert_eq!(navigator_tools().len(), 4);
        assert_eq!(
            curator_tools().names(),
            vec!["perplexity_ai_search", "save_in_notion", "upsert_to_qdrant"]
        );
        assert_eq!(scriptwriter_tools().len(), 5);
        assert_eq!(editor_tools().len(), 2);
    }
}

//! Exploration roadmap and notes export
//!
//! The roadmap is a left-to-right Mermaid flowchart with one node per source
//! in visit order, each linking back to its page.

use crate::session::CapturedPage;
use chrono::NaiveDate;

/// One source in the roadmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoadmapNode {
    pub title: Option<String>,
    pub url: String,
}

impl From<&CapturedPage> for RoadmapNode {
    fn from(page: &CapturedPage) -> Self {
        Self {
            title: Some(page.title.clone()).filter(|t| !t.trim().is_empty()),
            url: page.url.clone(),
        }
    }
}

/// Nodes for the sources a summary was built from.
///
/// Titles come from the pages still in the session; a source that has since
/// been removed keeps its URL but loses its title.
pub fn summary_nodes(sources: &[String], records: &[CapturedPage]) -> Vec<RoadmapNode> {
    sources
        .iter()
        .map(|url| match records.iter().find(|p| &p.url == url) {
            Some(page) => RoadmapNode::from(page),
            None => RoadmapNode {
                title: None,
                url: url.clone(),
            },
        })
        .collect()
}

/// Render the Mermaid flowchart definition. Empty input gives `None`.
pub fn mermaid(nodes: &[RoadmapNode]) -> Option<String> {
    if nodes.is_empty() {
        return None;
    }

    let mut out = String::from("graph LR;\n");
    for (index, node) in nodes.iter().enumerate() {
        let id = format!("node{}", index);
        let label = match &node.title {
            Some(title) => title.replace(['"', '`'], ""),
            None => format!("Source {}", index + 1),
        };
        out.push_str(&format!("    {}[\"{}\"];\n", id, label));
        out.push_str(&format!("    click {} \"{}\" \"_blank\";\n", id, node.url));
        if index > 0 {
            out.push_str(&format!("    node{} --> {};\n", index - 1, id));
        }
    }
    Some(out)
}

/// `mindnote-YYYY-MM-DD.md`
pub fn export_file_name(date: NaiveDate) -> String {
    format!("mindnote-{}.md", date.format("%Y-%m-%d"))
}

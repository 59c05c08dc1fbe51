//! Prompt construction for summarization and quiz generation

use crate::session::CapturedPage;

/// How many paragraphs per page go into the summarization prompt.
pub const DEFAULT_PARAGRAPH_LIMIT: usize = 10;

pub(crate) const SUMMARY_SYSTEM: &str =
    "You are an expert documentation summarizer that produces well-formatted markdown notes.";

pub(crate) const QUIZ_SYSTEM: &str =
    "You write study questions and answer only with a JSON array.";

const PAGE_SEPARATOR: &str = "\n\n-----------------\n\n";

/// Build the summarization prompt for the pages, in session order.
pub fn summary_prompt(pages: &[CapturedPage], paragraph_limit: usize) -> String {
    let blocks: Vec<String> = pages
        .iter()
        .enumerate()
        .map(|(index, page)| page_block(index, page, paragraph_limit))
        .collect();

    format!(
        "You are an expert documentation summarizer. Create concise, well-structured markdown notes from the following website content.\n\
         Focus on key concepts, definitions, and examples. Use proper markdown formatting with headings, lists, and code blocks.\n\
         Include a brief summary at the beginning.\n\n\
         CAPTURED WEBSITE CONTENT:\n{}\n\n\
         Generate comprehensive technical documentation notes in markdown format based on the above content.\n\
         Organize the content logically, with proper headings, sections, and code blocks.\n\
         Remove any redundant information and focus on the technical details.\n\
         Ensure all code blocks are properly formatted within markdown code fences.\n",
        blocks.join(PAGE_SEPARATOR)
    )
}

fn page_block(index: usize, page: &CapturedPage, paragraph_limit: usize) -> String {
    let title = if page.title.trim().is_empty() {
        "Untitled"
    } else {
        page.title.as_str()
    };

    let headings: Vec<String> = page
        .headings
        .iter()
        .map(|h| format!("{} {}", "#".repeat(h.level as usize), h.text))
        .collect();
    let code: Vec<String> = page
        .code_blocks
        .iter()
        .map(|c| format!("```\n{}\n```", c))
        .collect();
    let paragraphs: Vec<&str> = page
        .paragraphs
        .iter()
        .take(paragraph_limit)
        .map(String::as_str)
        .collect();
    let items: Vec<String> = page.list_items.iter().map(|i| format!("- {}", i)).collect();

    let mut block = format!(
        "\nWEBSITE {}: {}\nURL: {}\n\nHEADINGS:\n{}\n\nCODE BLOCKS:\n{}\n\nKEY CONTENT:\n{}\n\nLIST ITEMS:\n{}\n",
        index + 1,
        title,
        page.url,
        headings.join("\n"),
        code.join("\n\n"),
        paragraphs.join("\n\n"),
        items.join("\n"),
    );

    // Failure descriptions are not content
    if let Some(transcript) = page.transcript.as_deref().filter(|_| !page.transcript_failed) {
        let video = page.video_title.as_deref().unwrap_or(title);
        block.push_str(&format!("\nVIDEO TRANSCRIPT ({}):\n{}\n", video, transcript));
    }

    block
}

/// Build the quiz prompt asking for a strict JSON array.
pub fn quiz_prompt(content: &str, count: usize) -> String {
    format!(
        "Based on the following notes, write {count} quiz questions that test understanding of the key concepts.\n\
         Respond with ONLY a JSON array of {count} objects, each with the string fields \
         \"question\", \"answer\" and \"explanation\". Do not add any text outside the array.\n\n\
         NOTES:\n{content}\n"
    )
}

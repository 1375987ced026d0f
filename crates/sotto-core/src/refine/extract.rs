//! Extraction of the usable answer from a chat-template model transcript.
//!
//! Local instruction-tuned models echo chat markers and sometimes a
//! `<think>…</think>` reasoning block before the actual answer. This is a
//! linear scan with ordered rules and a final validity check; when the
//! remaining text is too short or leaks the prompt, the original text wins.

/// Minimum plausible length for a refined transcript.
const MIN_VALID_LEN: usize = 20;

/// Prompt fragments that must never appear in a valid answer.
const PROMPT_FRAGMENTS: &[&str] = &[
    "Refine the following transcript",
    "Correcting grammar and punctuation",
    "Respond with ONLY the refined",
];

/// Extract the assistant's answer from `raw_output`, falling back to
/// `original_text` when extraction produces nothing usable.
pub fn extract_assistant_response(raw_output: &str, original_text: &str) -> String {
    let mut output = raw_output.to_string();

    // 1. Keep only the content after the last assistant role marker
    if let Some(idx) = output.rfind("<|im_start|>assistant") {
        output = output[idx + "<|im_start|>assistant".len()..].to_string();
    }
    // A bare "assistant" label can survive on its own first line
    if let Some(rest) = output.trim_start().strip_prefix("assistant\n") {
        output = rest.to_string();
    }

    // 2. Drop the reasoning block
    if let Some(idx) = output.rfind("</think>") {
        output = output[idx + "</think>".len()..].to_string();
    } else if let Some(idx) = output.find("<think>") {
        // Unterminated thinking block: whatever precedes it may hold the
        // answer; otherwise the generation failed entirely.
        let before = output[..idx].trim().to_string();
        if before.len() >= MIN_VALID_LEN {
            output = before;
        } else {
            crate::verbose!("Model entered thinking mode without completing; keeping original text");
            return original_text.to_string();
        }
    }

    // 3. Strip remaining role/end markers
    for marker in ["<|im_start|>", "<|im_end|>", "<|endoftext|>", "<|end|>", "user\n", "assistant\n"] {
        output = output.replace(marker, "");
    }

    let output = output.trim();

    // 4. Validity check: length and prompt leakage
    let leaked = PROMPT_FRAGMENTS.iter().any(|frag| output.contains(frag));
    if output.len() < MIN_VALID_LEN || leaked {
        crate::verbose!(
            "Refinement extraction failed (length {}, leaked: {}); keeping original text",
            output.len(),
            leaked
        );
        return original_text.to_string();
    }

    output.to_string()
}

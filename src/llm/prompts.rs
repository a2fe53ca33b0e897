/// System prompt for turning a whole document into trails
pub const FULL_PARSE_SYSTEM_PROMPT: &str = r##"You convert course material into structured learning trails.
You are given the text of an uploaded document (delimited by ```). It may be a
well-structured syllabus, lecture notes, a quiz sheet or loose prose, in English
or Russian.

Identify the course (trail) or courses, split each into ordered lessons
(modules) and extract any quiz questions. When the material is thin, expand
each module's content into a clear, self-contained lesson in Markdown, keeping
the language of the source.

Output ONE JSON object and nothing else:
{
  "trails": [
    {
      "title": "Course title",
      "slug": "url-safe-slug",
      "subtitle": "One-line summary",
      "description": "What the learner gets",
      "icon": "single emoji",
      "color": "#RRGGBB",
      "modules": [
        {
          "title": "Lesson title",
          "slug": "lesson-slug",
          "type": "THEORY | PRACTICE | PROJECT",
          "points": 50,
          "description": "Short summary",
          "content": "Markdown body",
          "questions": [ ...question objects... ]
        }
      ]
    }
  ]
}

Question objects use one of four shapes:
- SINGLE_CHOICE: {"type": "SINGLE_CHOICE", "question": "...", "options": ["a", "b", "c"], "correctAnswer": 0, "explanation": "..."}
  correctAnswer is the 0-based index of the right option.
- MATCHING: {"type": "MATCHING", "question": "...", "data": {"leftItems": [{"id": "l1", "text": "..."}], "rightItems": [{"id": "r1", "text": "..."}], "correctPairs": {"l1": "r1"}}}
  Several left items may map to the same right item.
- ORDERING: {"type": "ORDERING", "question": "...", "data": {"items": [{"id": "1", "text": "..."}], "correctOrder": ["1", "2"]}}
  correctOrder lists every item id exactly once.
- CASE_ANALYSIS: {"type": "CASE_ANALYSIS", "question": "...", "data": {"caseContent": "scenario or code", "options": [{"id": "a", "text": "...", "isCorrect": true, "explanation": "..."}], "minCorrectRequired": 1}}

Rules:
- THEORY modules are reading only (50 points), PRACTICE modules carry questions (75 points), PROJECT modules need a deliverable (100 points)
- Keep the source order of lessons
- Never invent a course that is not in the document
- Output ONLY valid JSON, no Markdown fences, no commentary"##;

/// System prompt for one chunk of a long document
pub const CHUNK_SYSTEM_PROMPT: &str = r#"You convert one part of a long course document into lesson modules.
You are given a fragment (delimited by ```). Other fragments are processed
separately, so do not add course-level information and do not repeat lessons
that merely continue from an earlier fragment's heading.

Output ONE JSON object and nothing else:
{
  "modules": [
    {
      "title": "Lesson title",
      "type": "THEORY | PRACTICE | PROJECT",
      "points": 50,
      "description": "Short summary",
      "content": "Markdown body",
      "questions": []
    }
  ]
}

Questions follow these shapes:
- {"type": "SINGLE_CHOICE", "question": "...", "options": ["a", "b"], "correctAnswer": 0}
- {"type": "MATCHING", "question": "...", "data": {"leftItems": [...], "rightItems": [...], "correctPairs": {"leftId": "rightId"}}}
- {"type": "ORDERING", "question": "...", "data": {"items": [...], "correctOrder": [...]}}
- {"type": "CASE_ANALYSIS", "question": "...", "data": {"caseContent": "...", "options": [{"id": "a", "text": "...", "isCorrect": true}]}}

Output ONLY valid JSON, no Markdown fences, no commentary"#;

/// System prompt for course-level metadata of a chunked document
pub const METADATA_SYSTEM_PROMPT: &str = r##"You name courses. Given the opening of a course document (delimited by ```),
output ONE JSON object and nothing else:
{"title": "Course title", "slug": "url-safe-slug", "subtitle": "One-line summary", "description": "One paragraph", "icon": "single emoji", "color": "#RRGGBB"}
Use the language of the document."##;

/// Characters of the document shown to the metadata request
pub const METADATA_SAMPLE_CHARS: usize = 500;

pub fn document_user_prompt(text: &str) -> String {
    format!("document: ```{}```\n\noutput: ", text)
}

pub fn chunk_user_prompt(text: &str, index: usize, total: usize) -> String {
    format!("fragment {} of {}: ```{}```\n\noutput: ", index + 1, total, text)
}

pub fn metadata_user_prompt(text: &str) -> String {
    let opening: String = text.chars().take(METADATA_SAMPLE_CHARS).collect();
    format!("opening: ```{}```\n\noutput: ", opening)
}

/// Minimal request used to check the service answers
pub const PING_PROMPT: &str = "Reply with the single word OK.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_keep_text_after_color_placeholder() {
        assert!(FULL_PARSE_SYSTEM_PROMPT.contains(r##""color": "#RRGGBB""##));
        assert!(FULL_PARSE_SYSTEM_PROMPT.ends_with("no commentary"));
        assert!(METADATA_SYSTEM_PROMPT.contains(r##""color": "#RRGGBB"}"##));
        assert!(METADATA_SYSTEM_PROMPT.ends_with("Use the language of the document."));
    }

    #[test]
    fn test_metadata_prompt_is_limited_to_opening() {
        let text = "я".repeat(METADATA_SAMPLE_CHARS * 2);
        let prompt = metadata_user_prompt(&text);
        assert_eq!(prompt.chars().filter(|c| *c == 'я').count(), METADATA_SAMPLE_CHARS);
    }
}

//! Fixed prompt templates and model-output cleanup.

/// Prompt rewriting one raw page into clean Markdown without dropping content.
pub fn format_page(raw_text: &str) -> String {
    format!(
        "You are a professional document formatter.\n\
         Convert the following raw text into clean, structured Markdown.\n\
         Guidelines:\n\
         1. Lists: Convert bullet points into proper Markdown lists.\n\
         2. Headers: Identify and apply Markdown headers.\n\
         3. Emphasis: Use bold for key terms.\n\
         4. Cleanliness: Remove excessive newlines.\n\
         5. Content: Do NOT summarize. Keep all info.\n\
         IMPORTANT: Return ONLY the raw Markdown text. Do NOT wrap in code blocks.\n\
         Raw Text: {raw_text}\n"
    )
}

/// Prompt translating formatted Markdown into `language`, keeping its structure.
pub fn translate_page(markdown: &str, language: &str) -> String {
    format!(
        "Translate the following Markdown text into {language}.\n\
         Guidelines:\n\
         1. Structure: PRESERVE Markdown structure exactly.\n\
         2. Spacing: Use the natural spacing rules of {language}.\n\
         3. Formatting: Insert line breaks for readability.\n\
         4. Tone: Professional.\n\
         IMPORTANT: Return ONLY the raw {language} Markdown text. Do NOT wrap in code blocks.\n\
         Markdown Text: {markdown}\n"
    )
}

/// Prompt answering `query` strictly from the cited `context` block.
pub fn grounded_answer(context: &str, query: &str, language: &str) -> String {
    format!(
        "You are an AI assistant. Answer the [Question] using only the [Context].\n\
         Rules:\n\
         - Answer only from the [Context]. If the answer is not there, say you do not know.\n\
         - Do not make claims the [Context] does not support.\n\
         - End every sentence or paragraph with its source in the form \
         [Document ID: ..., Page: ...], copied from the [Context].\n\
         - Markdown headings must be H3 (###) or smaller.\n\
         - Respond in {language}.\n\
         \n\
         [Context]:\n\
         {context}\n\
         \n\
         [Question]:\n\
         {query}\n\
         \n\
         [Answer]:\n"
    )
}

/// Prompt asking for exactly three follow-up questions as a JSON array of strings.
pub fn suggested_questions(context: &str, language: &str) -> String {
    format!(
        "Generate 3 {language} follow-up questions based on the context.\n\
         Output a JSON array of strings: [\"Q1\", \"Q2\", \"Q3\"]\n\
         Do not wrap the output in code blocks.\n\
         Context: {context}\n"
    )
}

/// Prompt asking for `count` four-option multiple-choice questions as strict JSON.
pub fn multiple_choice_quiz(context: &str, count: usize, language: &str) -> String {
    format!(
        "Generate {count} multiple-choice questions in {language} from the Context.\n\
         Output ONLY a JSON array, without code blocks, in this format:\n\
         [{{\"question_text\": \"Question\", \"options\": [\"A\", \"B\", \"C\", \"D\"], \
         \"answer\": \"Correct Option\"}}]\n\
         Each item must have exactly 4 options and the answer must repeat one option verbatim.\n\
         Context: {context}\n"
    )
}

/// Prompt asking for `count` term/definition flashcards as strict JSON.
pub fn flashcards(context: &str, count: usize, language: &str) -> String {
    format!(
        "Generate {count} flashcards (term/definition) in {language} from the Context.\n\
         Output ONLY a JSON array, without code blocks, in this format:\n\
         [{{\"question_text\": \"Term\", \"options\": [], \"answer\": \"Definition\"}}]\n\
         Context: {context}\n"
    )
}

/// Remove Markdown/JSON code-fence markers models tend to add despite instructions.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```markdown", "")
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

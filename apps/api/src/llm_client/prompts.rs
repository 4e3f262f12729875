// Cross-cutting prompt fragments shared by every rubric.
// Rubric bodies live in evaluation::prompts.

/// System prompt sent with every evaluation call.
pub const EVALUATOR_SYSTEM: &str = "You are an expert CV evaluation assistant. \
    You apply a strict grading standard, similar to tough marking in an exam. \
    Follow the requested output format exactly. \
    Do NOT add greetings, apologies or commentary outside the requested format.";

/// Appended to rubrics that expect a JSON object back.
pub const JSON_ONLY_INSTRUCTION: &str = "\
    Respond with the JSON object only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Appended to free-text section rubrics so the score line is machine-readable.
pub const SCORE_LINE_INSTRUCTION: &str = "\
    End your report with a single line in exactly this form: Score: <n>/100 \
    where <n> is an integer between 0 and 100.";

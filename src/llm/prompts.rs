//! LLM prompts for answering, grading, and data generation.

/// Collection of prompts used across the pipeline.
pub struct Prompts;

impl Prompts {
    /// System prompt for the assistant under evaluation.
    pub fn system_assistant() -> &'static str {
        "You are a physics tutor. Answer the question accurately and concisely. \
         For multiple-choice questions state the selected option letter. \
         For numeric questions state the final value with units."
    }

    /// Prompt for answering a question without retrieval context.
    pub fn question_only() -> &'static str {
        "Question: {question}"
    }

    /// Prompt for answering a question with retrieved context prepended.
    pub fn question_with_context() -> &'static str {
        r#"Use the following context to answer the question. If the context is not relevant, answer from your own knowledge.

Context:
{context}

Question: {question}"#
    }

    /// System prompt for all grading calls.
    pub fn system_grader() -> &'static str {
        "You are an impartial physics grader. Respond with valid JSON only, no other text."
    }

    /// Prompt asking the judge to extract the selected MCQ option.
    pub fn mcq_extractor() -> &'static str {
        r#"A student answered a multiple-choice physics question. Identify which option (A, B, C, or D) the student selected.

Student's Answer: "{prediction}"

Instructions:
1. The student may state the letter directly, or write out the text of an option.
2. Ignore formatting artifacts and extra text.
3. If no option can be identified, use null.

Respond in JSON format:
{"option": "<A, B, C, D, or null>"}

Respond with only the JSON, no other text."#
    }

    /// Prompt asking the judge to extract the final numeric value.
    pub fn numeric_extractor() -> &'static str {
        r#"A student answered a numeric physics question. Extract the student's final numeric answer.

Student's Answer: "{prediction}"

Instructions:
1. Identify the final numeric value, even if buried in text or JSON.
2. Ignore units.
3. If no numeric value is present, use null.

Respond in JSON format:
{"value": <number or null>}

Respond with only the JSON, no other text."#
    }

    /// Rubric prompt for grading free-text explanations.
    pub fn explanation_rubric() -> &'static str {
        r#"Grade the student's physics explanation against the reference explanation.

Student's Answer: "{prediction}"
Reference Answer: "{reference}"

Rubric (weighting: conceptual correctness 50%, completeness 30%, clarity 20%):
- 1.0: Correct. Captures the core physical concept. Ignore formatting, length, or extra chatty text.
- 0.75: Good. Correct core concept but misses minor details.
- 0.5: Weak. Some correct keywords but misses the main logic.
- 0.25: Poor. Barely relevant or mostly incorrect.
- 0.0: Wrong. Completely incorrect, irrelevant, or no answer.

Instructions:
1. Compare the core physical meaning. Do not penalize verbosity or formatting.
2. Allowed scores: [0.0, 0.25, 0.5, 0.75, 1.0].

Respond in JSON format:
{"score": <float>, "reasoning": "<short text>"}

Respond with only the JSON, no other text."#
    }

    /// System prompt for instruction-pair generation.
    pub fn system_generator() -> &'static str {
        "You are a physics expert creating training data. Output ONLY valid JSON."
    }

    /// Prompt for generating instruction pairs from a textbook chunk.
    pub fn pair_generation() -> &'static str {
        r#"Here is a section from a physics textbook:

{text}

Based on this text, generate {num_pairs} diverse instruction-response pairs.
Mix explanation, problem-solving, and concept Q&A.

Format:
[
  {"instruction": "Question?", "input": "", "output": "Answer..."},
  ...
]

Return ONLY the JSON list. No other text."#
    }
}

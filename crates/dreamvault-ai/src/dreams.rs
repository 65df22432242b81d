use chrono::NaiveDate;
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::{AiError, ChatMessage, ChatRequest, ImageRequest, LanguageModel};

pub const UNTITLED_DREAM: &str = "Untitled Dream";

const INTERPRET_MODEL: &str = "gpt-4o";
const TITLE_MODEL: &str = "gpt-4o";
const HOROSCOPE_MODEL: &str = "gpt-4";

const TITLE_INPUT_CHARS: usize = 500;
const ARTWORK_INPUT_CHARS: usize = 300;

pub const HOROSCOPE_FIELDS: [&str; 4] = ["dailyHoroscope", "dreamConnection", "cosmicInsight", "advice"];

const INTERPRET_SYSTEM_PROMPT: &str = "You are an expert dream interpreter with deep knowledge of psychology, \
symbolism, and the unconscious mind. Analyze the dream provided and return a detailed interpretation in JSON format.
IMPORTANT: Return ONLY the JSON object without any markdown formatting, code blocks, or additional text.

The JSON should include:
- summary: A concise interpretation of the dream's meaning (1-2 paragraphs)
- emotions: An array of 3-5 emotions detected in the dream
- symbols: An array of objects, each with a \"name\" and \"meaning\" property for key symbols in the dream
- insights: Deeper psychological insights about what the dream might reveal about the dreamer's unconscious
- recommendations: Practical advice based on the dream interpretation
- affirmation: A positive affirmation related to the dream's message

Keep your interpretation balanced, insightful, and psychologically sound.";

const TITLE_SYSTEM_PROMPT: &str = "You are a dream title generator. Generate a short, evocative title \
(5 words or less) for the dream described. Return ONLY the title without quotes, explanations, or additional text.";

const HOROSCOPE_SYSTEM_PROMPT: &str = "You are an expert dream interpreter and astrologer. Provide insightful, \
personalized horoscope interpretations that connect dream content with astrological influences. Be specific, \
thoughtful, and provide genuine value. Return only valid JSON.";

const ARTWORK_GUIDANCE: &str = "Make the image serene, peaceful, and uplifting. Use soft colors and gentle imagery. \
Avoid any disturbing, scary, or negative elements. Create a dreamy, ethereal quality with positive symbolism.";

fn prefix_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Returns the body of the first fenced block (```json or ```), or the input
/// unchanged when there is no non-empty fenced block.
pub fn strip_code_fences(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text;
    };
    let rest = &text[start + 3..];
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let Some(end) = rest.find("```") else {
        return text;
    };
    let inner = rest[..end].trim();
    if inner.is_empty() { text } else { inner }
}

fn parse_fallback(raw: &str) -> Value {
    json!({
        "error": "Failed to parse interpretation",
        "summary": "We encountered an issue processing your dream. Here's the raw interpretation:",
        "rawResponse": raw,
        "emotions": ["unknown"],
        "symbols": [{ "name": "error", "meaning": "There was an error processing your dream symbols" }],
        "insights": "We couldn't generate proper insights due to a technical issue.",
        "recommendations": "Please try again with a different or more detailed dream description.",
        "affirmation": "I am patient with technology and understand that sometimes things don't work perfectly.",
    })
}

fn upstream_fallback() -> Value {
    json!({
        "error": "Failed to interpret dream",
        "summary": "We encountered a technical issue while interpreting your dream.",
        "emotions": ["unknown"],
        "symbols": [{ "name": "error", "meaning": "There was an error processing your dream" }],
        "insights": "We couldn't generate insights due to a technical issue.",
        "recommendations": "Please try again later or contact support if the issue persists.",
        "affirmation": "I am patient and understanding when technology doesn't work as expected.",
    })
}

/// Always yields a JSON document: the model's interpretation, or a fallback
/// payload carrying an `error` field.
pub async fn interpret_dream(model: &dyn LanguageModel, dream_text: &str) -> Value {
    let request = ChatRequest {
        model: INTERPRET_MODEL.into(),
        messages: vec![
            ChatMessage::system(INTERPRET_SYSTEM_PROMPT),
            ChatMessage::user(format!("Interpret this dream: {}", dream_text)),
        ],
        temperature: Some(0.7),
        max_tokens: None,
    };

    let text = match model.chat(request).await {
        Ok(text) => text,
        Err(e) => {
            error!("Dream interpretation failed: {}", e);
            return upstream_fallback();
        }
    };

    let body = strip_code_fences(&text);
    match serde_json::from_str::<Value>(body) {
        Ok(interpretation) => interpretation,
        Err(e) => {
            warn!("Interpretation was not valid JSON: {}", e);
            parse_fallback(body)
        }
    }
}

pub async fn generate_title(model: &dyn LanguageModel, dream_text: &str) -> Result<String, AiError> {
    let request = ChatRequest {
        model: TITLE_MODEL.into(),
        messages: vec![
            ChatMessage::system(TITLE_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Generate a title for this dream: {}...",
                prefix_chars(dream_text, TITLE_INPUT_CHARS)
            )),
        ],
        temperature: Some(0.7),
        max_tokens: Some(20),
    };

    let text = match model.chat(request).await {
        Ok(text) => text,
        Err(AiError::EmptyResponse) => return Ok(UNTITLED_DREAM.to_string()),
        Err(e) => return Err(e),
    };
    let title = text.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if title.is_empty() {
        Ok(UNTITLED_DREAM.to_string())
    } else {
        Ok(title.to_string())
    }
}

/// Builds the image prompt. The interpretation's summary wins over the raw
/// text; symbol names are appended when present.
pub fn artwork_prompt(dream_text: Option<&str>, interpretation: Option<&Value>) -> String {
    let mut prompt = String::from("Create a beautiful, positive, calming dream artwork. ");

    let summary = interpretation
        .and_then(|i| i.get("summary"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    let about = match summary {
        Some(summary) => summary,
        None => prefix_chars(dream_text.unwrap_or_default(), ARTWORK_INPUT_CHARS),
    };
    prompt.push_str(&format!("The dream is about: {} ", about));
    prompt.push_str(ARTWORK_GUIDANCE);

    let symbols: Vec<&str> = interpretation
        .and_then(|i| i.get("symbols"))
        .and_then(Value::as_array)
        .map(|symbols| {
            symbols
                .iter()
                .filter_map(|s| s.get("name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if !symbols.is_empty() {
        prompt.push_str(&format!(" Include these elements if possible: {}.", symbols.join(", ")));
    }

    prompt
}

pub async fn generate_artwork(model: &dyn LanguageModel, prompt: String) -> Result<String, AiError> {
    model
        .generate_image(ImageRequest::dream_artwork(prompt))
        .await?
        .ok_or_else(|| AiError::InvalidResponse("No image was generated".into()))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn horoscope_prompt(dream_text: &str, interpretation: Option<&Value>, sign: &str, today: NaiveDate) -> String {
    let interpretation = interpretation
        .map(|i| format!("Dream interpretation: {}\n", i))
        .unwrap_or_default();
    format!(
        "Dream content: \"{dream_text}\"
{interpretation}Zodiac sign: {sign}
Current date: {today}
Generate a personalized horoscope interpretation that connects this dream with the person's zodiac sign ({sign}).
Explain how the dream symbols and themes relate to current astrological influences for {sign}.
Include insights about what this dream might be revealing about their current life path based on their astrological profile.
Provide guidance on how they can use this dream insight in conjunction with their zodiac traits.
Format the response in JSON with the following structure:
{{
  \"dailyHoroscope\": \"A general daily horoscope for {sign}\",
  \"dreamConnection\": \"How this dream connects to your astrological profile\",
  \"cosmicInsight\": \"A deeper cosmic insight about the dream's meaning\",
  \"advice\": \"Practical advice based on the dream and zodiac sign\"
}}",
        today = today.format("%Y-%m-%d"),
    )
}

/// Generates the four-part horoscope. Any missing or empty field is an error.
pub async fn generate_horoscope(
    model: &dyn LanguageModel,
    dream_text: &str,
    interpretation: Option<&Value>,
    sign: &str,
    today: NaiveDate,
) -> Result<Value, AiError> {
    let request = ChatRequest {
        model: HOROSCOPE_MODEL.into(),
        messages: vec![
            ChatMessage::system(HOROSCOPE_SYSTEM_PROMPT),
            ChatMessage::user(horoscope_prompt(dream_text, interpretation, sign, today)),
        ],
        temperature: None,
        max_tokens: None,
    };

    let text = model.chat(request).await?;
    let horoscope: Value = serde_json::from_str(strip_code_fences(&text)).map_err(|e| {
        error!("Horoscope was not valid JSON: {} (raw: {})", e, text);
        AiError::InvalidResponse(format!("horoscope is not JSON: {}", e))
    })?;

    if let Some(missing) = HOROSCOPE_FIELDS
        .iter()
        .find(|field| !horoscope.get(**field).is_some_and(is_truthy))
    {
        return Err(AiError::InvalidResponse(format!("horoscope missing {}", missing)));
    }

    Ok(horoscope)
}

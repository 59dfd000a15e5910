//! Recognition request/response shapes and transcript extraction.
//!
//! The recognizer normally answers with a `results[].alternatives[]`
//! hierarchy, but it also returns a bare object (`{}` or only billing
//! metadata) when it heard nothing, and partial bodies have been observed
//! in the wild.  [`parse_recognize_response`] therefore tries the structured
//! shape first and falls back to scanning the raw text for a `"transcript"`
//! string.

use serde::{Deserialize, Serialize};

use super::client::TranscriptionError;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Body of `POST /v1/speech:recognize`.
#[derive(Debug, Clone, Serialize)]
pub struct RecognizeRequest {
    pub config: RecognitionConfig,
    pub audio: RecognitionAudio,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionConfig {
    pub encoding: &'static str,
    pub sample_rate_hertz: u32,
    pub language_code: String,
    pub model: String,
    pub use_enhanced: bool,
    pub enable_automatic_punctuation: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecognitionAudio {
    /// Base64 of the complete WAV file.
    pub content: String,
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Recognised speech.  `text` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptResult {
    pub text: String,
    /// Recognizer confidence in `[0, 1]`, when reported.
    pub confidence: Option<f32>,
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    results: Option<Vec<RecognitionResult>>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    alternatives: Option<Vec<Alternative>>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    transcript: Option<String>,
    confidence: Option<f32>,
}

/// Extract the transcript from a recognizer reply body.
///
/// Consecutive results (one per utterance segment) are joined with a single
/// space using each result's top alternative.  Blank text counts as no
/// result.
///
/// # Errors
///
/// [`TranscriptionError::NoResult`] when the body is empty, unparseable and
/// contains no `"transcript"` string, or only blank transcripts.
pub fn parse_recognize_response(body: &str) -> Result<TranscriptResult, TranscriptionError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(TranscriptionError::NoResult);
    }

    let structured = match serde_json::from_str::<RecognizeResponse>(body) {
        Ok(response) => from_structured(response),
        Err(e) => {
            log::warn!("stt: reply is not well-formed JSON ({e}), scanning raw text");
            None
        }
    };

    let result = structured.or_else(|| {
        scan_transcript(body).map(|text| TranscriptResult {
            text,
            confidence: None,
        })
    });

    match result {
        Some(mut r) => {
            r.text = r.text.trim().to_string();
            if r.text.is_empty() {
                Err(TranscriptionError::NoResult)
            } else {
                Ok(r)
            }
        }
        None => Err(TranscriptionError::NoResult),
    }
}

fn from_structured(response: RecognizeResponse) -> Option<TranscriptResult> {
    let mut confidence = None;
    let mut parts = Vec::new();

    for result in response.results.unwrap_or_default() {
        let top = result
            .alternatives
            .and_then(|alts| alts.into_iter().next());
        let Some(alt) = top else { continue };
        let Some(text) = alt.transcript else { continue };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if parts.is_empty() {
            confidence = alt.confidence;
        }
        parts.push(text.to_string());
    }

    if parts.is_empty() {
        return None;
    }
    Some(TranscriptResult {
        text: parts.join(" "),
        confidence,
    })
}

/// Best-effort scrape of the first non-blank `"transcript": "<string>"`
/// pair in `raw`, decoding JSON string escapes.
///
/// Returns `None` when no terminated, non-blank string value is found.
pub(crate) fn scan_transcript(raw: &str) -> Option<String> {
    const KEY: &str = "\"transcript\"";
    let mut from = 0;

    while let Some(found) = raw[from..].find(KEY) {
        let after_key = from + found + KEY.len();
        from = after_key;

        let rest = raw[after_key..].trim_start();
        let Some(rest) = rest.strip_prefix(':') else { continue };
        let Some(rest) = rest.trim_start().strip_prefix('"') else { continue };

        if let Some(text) = read_json_string(rest) {
            if !text.trim().is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Read a JSON string body up to its closing quote.  `input` starts just
/// after the opening quote.
fn read_json_string(input: &str) -> Option<String> {
    let mut out = String::new();
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(out),
            '\\' => match chars.next()? {
                '"' => out.push('"'),
                '\\' => out.push('\\'),
                '/' => out.push('/'),
                'b' => out.push('\u{08}'),
                'f' => out.push('\u{0C}'),
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                'u' => {
                    let high = read_hex4(&mut chars)?;
                    let code = if (0xD800..0xDC00).contains(&high) {
                        // Surrogate pair: expect a following \uDC00-\uDFFF.
                        let mut lookahead = chars.clone();
                        if lookahead.next() == Some('\\') && lookahead.next() == Some('u') {
                            let low = read_hex4(&mut lookahead)?;
                            if (0xDC00..0xE000).contains(&low) {
                                chars = lookahead;
                                0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
                            } else {
                                high
                            }
                        } else {
                            high
                        }
                    } else {
                        high
                    };
                    out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
                other => out.push(other),
            },
            c => out.push(c),
        }
    }
    None
}

fn read_hex4(chars: &mut std::str::Chars<'_>) -> Option<u32> {
    let mut value = 0;
    for _ in 0..4 {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    Some(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

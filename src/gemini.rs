use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::config::ModelsConfig;

macro_rules! debug_eprintln {
    ($($arg:tt)*) => {
        if std::env::var("QUANTDESK_DEBUG").is_ok() {
            eprintln!($($arg)*);
        }
    };
}

/// Reasoning-effort hint for the quant prediction profile.
pub const QUANT_THINKING_BUDGET: i32 = 32768;

pub const DIGEST_SENTINEL: &str =
    "[UPLINK ERROR] Market digest feed unavailable. Check connection and retry.";
pub const QUANT_SENTINEL: &str =
    "[UPLINK ERROR] Quant engine did not respond. Re-submit the query.";
pub const DEALS_SENTINEL: &str = "[UPLINK ERROR] Deal flow scan failed. Re-submit to retry.";
pub const RESOURCES_SENTINEL: &str =
    "[UPLINK ERROR] Resource survey failed. Re-submit to retry.";
pub const CHART_SENTINEL: &str = "[UPLINK ERROR] Chart analysis failed. Re-submit to retry.";

const DIGEST_PROMPT: &str = "Give exactly 3 concise headlines summarizing the most \
     market-moving global financial news right now. Plain text, one headline per line.";

const QUANT_SYSTEM_INSTRUCTION: &str = "You are a quantitative analyst on a trading desk. \
     Produce a disciplined scenario analysis for the user's query: base/bull/bear cases with \
     rough probabilities, the key drivers behind each, and what would invalidate the view. \
     Be direct and specific; no disclaimers.";

const CHART_SYSTEM_INSTRUCTION: &str = "You are a technical chart analyst. Identify chart \
     patterns, trend structure, and key support and resistance levels in the supplied image. \
     Quote price levels where legible.";

const DEFAULT_CHART_DIRECTIVE: &str =
    "Analyze this chart for technical patterns, trend direction, and notable levels.";

const UNTITLED_SOURCE: &str = "Untitled source";

/// A reference a grounded answer drew from. Web and map provenance collapse
/// into this one shape at the gateway boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub uri: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub text: String,
    pub citations: Vec<Citation>,
}

impl AnalysisResult {
    fn sentinel(text: &str) -> Self {
        AnalysisResult {
            text: text.to_string(),
            citations: Vec::new(),
        }
    }
}

// Wire shapes for models/{model}:generateContent.

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ToolConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    #[serde(skip_serializing_if = "Option::is_none")]
    google_search: Option<EmptyTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    google_maps: Option<EmptyTool>,
}

#[derive(Debug, Serialize)]
struct EmptyTool {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolConfig {
    retrieval_config: RetrievalConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalConfig {
    lat_lng: LatLng,
}

#[derive(Debug, Serialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<SourceRef>,
    maps: Option<SourceRef>,
}

#[derive(Debug, Deserialize)]
struct SourceRef {
    uri: Option<String>,
    title: Option<String>,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let joined: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if joined.trim().is_empty() {
            None
        } else {
            Some(joined)
        }
    }

    /// Normalizes grounding chunks into renderable citations. A chunk with
    /// neither a web nor a maps reference, or one without a uri, is dropped;
    /// original order is kept.
    fn citations(&self) -> Vec<Citation> {
        let Some(metadata) = self
            .candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
        else {
            return Vec::new();
        };

        metadata
            .grounding_chunks
            .iter()
            .filter_map(|chunk| {
                let source = chunk.web.as_ref().or(chunk.maps.as_ref())?;
                let uri = source.uri.clone()?;
                let title = source
                    .title
                    .clone()
                    .unwrap_or_else(|| UNTITLED_SOURCE.to_string());
                Some(Citation { uri, title })
            })
            .collect()
    }
}

fn user_text(text: impl Into<String>) -> Vec<Content> {
    vec![Content {
        parts: vec![Part {
            text: Some(text.into()),
            inline_data: None,
        }],
    }]
}

fn system_text(text: &str) -> Option<Content> {
    Some(Content {
        parts: vec![Part {
            text: Some(text.to_string()),
            inline_data: None,
        }],
    })
}

fn digest_request() -> GenerateContentRequest {
    GenerateContentRequest {
        contents: user_text(DIGEST_PROMPT),
        system_instruction: None,
        generation_config: None,
        tools: None,
        tool_config: None,
    }
}

fn quant_request(query: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: user_text(query),
        system_instruction: system_text(QUANT_SYSTEM_INSTRUCTION),
        generation_config: Some(GenerationConfig {
            thinking_config: ThinkingConfig {
                thinking_budget: QUANT_THINKING_BUDGET,
            },
        }),
        tools: None,
        tool_config: None,
    }
}

fn deals_request(sector: &str) -> GenerateContentRequest {
    let prompt = format!(
        "Act as a deal-flow analyst. Find recent, specific opportunities in the {} sector: \
         distressed assets, funding rounds, or acquisition targets. Cite your sources.",
        sector
    );
    GenerateContentRequest {
        contents: user_text(prompt),
        system_instruction: None,
        generation_config: None,
        tools: Some(vec![Tool {
            google_search: Some(EmptyTool {}),
            google_maps: None,
        }]),
        tool_config: None,
    }
}

fn resources_request(resource_type: &str, location: Option<(f64, f64)>) -> GenerateContentRequest {
    let prompt = format!(
        "Locate notable {} deposits, producers, or processing facilities. \
         Summarize what each location is known for.",
        resource_type
    );
    GenerateContentRequest {
        contents: user_text(prompt),
        system_instruction: None,
        generation_config: None,
        tools: Some(vec![Tool {
            google_search: None,
            google_maps: Some(EmptyTool {}),
        }]),
        tool_config: location.map(|(latitude, longitude)| ToolConfig {
            retrieval_config: RetrievalConfig {
                lat_lng: LatLng {
                    latitude,
                    longitude,
                },
            },
        }),
    }
}

fn chart_request(image_base64: &str, directive: Option<&str>) -> GenerateContentRequest {
    let directive = directive
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(DEFAULT_CHART_DIRECTIVE);
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![
                Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: "image/png".to_string(),
                        data: image_base64.to_string(),
                    }),
                },
                Part {
                    text: Some(directive.to_string()),
                    inline_data: None,
                },
            ],
        }],
        system_instruction: system_text(CHART_SYSTEM_INSTRUCTION),
        generation_config: None,
        tools: None,
        tool_config: None,
    }
}

pub struct GeminiClient {
    base_url: String,
    api_key: String,
    models: ModelsConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(base_url: String, api_key: String, models: ModelsConfig) -> Self {
        GeminiClient {
            base_url,
            api_key,
            models,
            client: reqwest::Client::new(),
        }
    }

    /// One outbound call. Errors from here never escape the public
    /// operations below; they are folded into per-operation sentinels.
    async fn dispatch(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Gemini API error: {}", response.status()));
        }

        Ok(response.json().await?)
    }

    fn settle_text(result: Result<GenerateContentResponse>, op: &str, sentinel: &str) -> String {
        let settled = result.and_then(|response| {
            response
                .text()
                .ok_or_else(|| anyhow!("response carried no text"))
        });
        match settled {
            Ok(text) => text,
            Err(e) => {
                debug_eprintln!("[gemini] {} failed: {:#}", op, e);
                sentinel.to_string()
            }
        }
    }

    fn settle_analysis(
        result: Result<GenerateContentResponse>,
        op: &str,
        sentinel: &str,
    ) -> AnalysisResult {
        match result {
            Ok(response) => match response.text() {
                Some(text) => AnalysisResult {
                    text,
                    citations: response.citations(),
                },
                None => {
                    debug_eprintln!("[gemini] {} failed: response carried no text", op);
                    AnalysisResult::sentinel(sentinel)
                }
            },
            Err(e) => {
                debug_eprintln!("[gemini] {} failed: {:#}", op, e);
                AnalysisResult::sentinel(sentinel)
            }
        }
    }

    pub async fn fetch_market_digest(&self) -> String {
        let result = self.dispatch(&self.models.digest, &digest_request()).await;
        Self::settle_text(result, "market digest", DIGEST_SENTINEL)
    }

    pub async fn generate_quant_prediction(&self, query: &str) -> String {
        let result = self.dispatch(&self.models.quant, &quant_request(query)).await;
        Self::settle_text(result, "quant prediction", QUANT_SENTINEL)
    }

    pub async fn find_deals(&self, sector: &str) -> AnalysisResult {
        let result = self.dispatch(&self.models.deals, &deals_request(sector)).await;
        Self::settle_analysis(result, "deal sourcing", DEALS_SENTINEL)
    }

    pub async fn find_resources(
        &self,
        resource_type: &str,
        location: Option<(f64, f64)>,
    ) -> AnalysisResult {
        let result = self
            .dispatch(
                &self.models.resources,
                &resources_request(resource_type, location),
            )
            .await;
        Self::settle_analysis(result, "resource mapping", RESOURCES_SENTINEL)
    }

    pub async fn analyze_image(&self, image_base64: &str, directive: Option<&str>) -> String {
        let result = self
            .dispatch(&self.models.vision, &chart_request(image_base64, directive))
            .await;
        Self::settle_text(result, "chart analysis", CHART_SENTINEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unreachable_client() -> GeminiClient {
        // Discard port; connections are refused immediately.
        GeminiClient::new(
            "http://127.0.0.1:9".to_string(),
            "test-key".to_string(),
            ModelsConfig::default(),
        )
    }

    #[test]
    fn test_quant_request_carries_budget_and_query() {
        let request = quant_request("rate cut impact on small caps");
        let v = serde_json::to_value(&request).unwrap();

        assert_eq!(
            v["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            json!(32768)
        );
        assert_eq!(
            v["contents"][0]["parts"][0]["text"],
            json!("rate cut impact on small caps")
        );
        assert!(v["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("quantitative analyst"));
        assert!(v.get("tools").is_none());
    }

    #[test]
    fn test_digest_request_is_bare() {
        let v = serde_json::to_value(digest_request()).unwrap();
        assert!(v.get("tools").is_none());
        assert!(v.get("systemInstruction").is_none());
        assert!(v.get("generationConfig").is_none());
        assert!(v["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("3 concise headlines"));
    }

    #[test]
    fn test_deals_request_enables_web_search() {
        let v = serde_json::to_value(deals_request("semiconductors")).unwrap();
        assert_eq!(v["tools"][0]["googleSearch"], json!({}));
        assert!(v["tools"][0].get("googleMaps").is_none());
        assert!(v["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("semiconductors"));
    }

    #[test]
    fn test_resources_request_without_location_has_no_constraint() {
        let v = serde_json::to_value(resources_request("lithium", None)).unwrap();
        assert_eq!(v["tools"][0]["googleMaps"], json!({}));
        assert!(v.get("toolConfig").is_none());
    }

    #[test]
    fn test_resources_request_with_location_constrains_retrieval() {
        let v = serde_json::to_value(resources_request("lithium", Some((10.0, 20.0)))).unwrap();
        assert_eq!(
            v["toolConfig"]["retrievalConfig"]["latLng"],
            json!({"latitude": 10.0, "longitude": 20.0})
        );
    }

    #[test]
    fn test_chart_request_parts_and_default_directive() {
        let v = serde_json::to_value(chart_request("QUJD", None)).unwrap();
        let parts = v["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/png"));
        assert_eq!(parts[0]["inlineData"]["data"], json!("QUJD"));
        assert_eq!(parts[1]["text"], json!(DEFAULT_CHART_DIRECTIVE));

        let v = serde_json::to_value(chart_request("QUJD", Some("find the wedge"))).unwrap();
        assert_eq!(v["contents"][0]["parts"][1]["text"], json!("find the wedge"));
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "alpha " }, { "text": "beta" }] }
            }]
        }))
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("alpha beta"));

        let empty: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [] } }]
        }))
        .unwrap();
        assert_eq!(empty.text(), None);
    }

    #[test]
    fn test_citation_filtering_preserves_order_and_defaults_title() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "grounded answer" }] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "maps": { "uri": "https://maps.example/mine" } },
                        { "web": { "uri": "https://example.com/news", "title": "Sector news" } },
                        { }
                    ]
                }
            }]
        }))
        .unwrap();

        let citations = response.citations();
        assert_eq!(
            citations,
            vec![
                Citation {
                    uri: "https://maps.example/mine".to_string(),
                    title: UNTITLED_SOURCE.to_string(),
                },
                Citation {
                    uri: "https://example.com/news".to_string(),
                    title: "Sector news".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_chunk_without_uri_is_not_renderable() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "x" }] },
                "groundingMetadata": {
                    "groundingChunks": [{ "web": { "title": "No link" } }]
                }
            }]
        }))
        .unwrap();
        assert!(response.citations().is_empty());
    }

    #[tokio::test]
    async fn test_digest_failure_yields_sentinel() {
        let client = unreachable_client();
        assert_eq!(client.fetch_market_digest().await, DIGEST_SENTINEL);
    }

    #[tokio::test]
    async fn test_quant_failure_yields_sentinel() {
        let client = unreachable_client();
        assert_eq!(
            client.generate_quant_prediction("any query").await,
            QUANT_SENTINEL
        );
    }

    #[tokio::test]
    async fn test_deals_failure_yields_sentinel_result() {
        let client = unreachable_client();
        let result = client.find_deals("energy").await;
        assert_eq!(result.text, DEALS_SENTINEL);
        assert!(result.citations.is_empty());
    }

    #[tokio::test]
    async fn test_resources_failure_yields_sentinel_result() {
        let client = unreachable_client();
        let result = client.find_resources("lithium", Some((10.0, 20.0))).await;
        assert_eq!(result.text, RESOURCES_SENTINEL);
        assert!(result.citations.is_empty());
    }

    #[tokio::test]
    async fn test_chart_failure_yields_sentinel() {
        let client = unreachable_client();
        assert_eq!(client.analyze_image("QUJD", None).await, CHART_SENTINEL);
    }

    #[test]
    fn test_sentinels_are_distinct() {
        let mut sentinels = vec![
            DIGEST_SENTINEL,
            QUANT_SENTINEL,
            DEALS_SENTINEL,
            RESOURCES_SENTINEL,
            CHART_SENTINEL,
        ];
        sentinels.sort();
        sentinels.dedup();
        assert_eq!(sentinels.len(), 5);
    }
}

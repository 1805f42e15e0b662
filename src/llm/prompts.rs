//! Prompt templates for LLM interactions

use super::{ContentPart, MessageContent};
use crate::catalog::Review;
use crate::extract::PersonaPhrase;

/// System prompt for review analysis and persona normalization
pub const ANALYST_SYSTEM_PROMPT: &str = "You are an expert product analyst specializing in \
     mobile app user experience, market opportunities, and competitive positioning.";

/// System prompt for ASO recommendation and keyword intelligence prompts
pub const ASO_SYSTEM_PROMPT: &str = "You are an expert App Store Optimization (ASO) consultant \
     with deep knowledge of keyword optimization, competitive positioning, and conversion rate \
     optimization for mobile apps.";

/// System prompt for screenshot analysis
pub const VISION_SYSTEM_PROMPT: &str = "You are an expert UI/UX analyst specializing in mobile \
     app design and App Store optimization.";

/// Reviews included per band in a comprehensive prompt
const MAX_REVIEWS_PER_BAND: usize = 30;

/// Reviews included in a simple (single band) prompt
const MAX_REVIEWS_SIMPLE: usize = 50;

/// Raw persona phrases forwarded for normalization
pub const MAX_PHRASES_FOR_NORMALIZATION: usize = 50;

/// Listing metadata snapshot used by the ASO and keyword prompts
#[derive(Debug, Clone)]
pub struct ListingProfile {
    pub name: String,
    pub rank: usize,
    pub subtitle: Option<String>,
    pub promotional_text: Option<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<i64>,
    pub description: Option<String>,
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

fn reviews_block(reviews: &[Review], limit: usize) -> String {
    reviews
        .iter()
        .take(limit)
        .map(|review| {
            let content = truncate(review.content.as_deref().unwrap_or(""), 200);
            format!(
                "App: {}\nRating: {}/5\nTitle: {}\nReview: {}\n---",
                review.app_name,
                review.rating,
                review.title.as_deref().unwrap_or(""),
                content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Comprehensive two-band analysis prompt
///
/// High-rating reviews feed the table-stakes extraction; low-rating reviews
/// feed pain points and differentiation opportunities.
pub fn comprehensive_analysis(low_reviews: &[Review], high_reviews: &[Review], keyword: &str) -> String {
    format!(
        r#"Analyze the following reviews from the top apps for the keyword "{keyword}".

You have two sets of reviews:
1. LOW-RATING REVIEWS (1-2 stars): Dissatisfied users highlighting problems and missing features
2. HIGH-RATING REVIEWS (4-5 stars): Satisfied users praising features they love

Your task is to:

1. From the HIGH-RATING reviews, identify "table stakes" features - the core features that users expect and praise across multiple apps. These are features any app in this category must have to be competitive.

2. From the LOW-RATING reviews, identify pain points and opportunities for differentiation - problems that existing apps haven't solved well.

3. Synthesize both to determine:
   - Top 3 "Table Stakes" features: What you need to fit in (baseline expectations)
   - Top 3 "Differentiators": What you need to stand out (unmet needs/opportunities)

LOW-RATING REVIEWS (1-2 stars):

{low_block}

HIGH-RATING REVIEWS (4-5 stars):

{high_block}

Format your response as valid JSON with this structure:
{{
  "summary": "Brief executive summary of the competitive landscape",
  "table_stakes": [
    {{
      "feature": "Feature name",
      "description": "Why this is essential",
      "evidence": "How often it appears in positive reviews"
    }}
  ],
  "pain_points": [
    {{
      "category": "Pain point category",
      "description": "What users are complaining about",
      "frequency": "How common this is"
    }}
  ],
  "differentiators": [
    {{
      "opportunity": "Opportunity name",
      "description": "How to stand out by addressing this",
      "rationale": "Why this would differentiate"
    }}
  ],
  "competitive_summary": {{
    "top_3_table_stakes": ["Feature 1", "Feature 2", "Feature 3"],
    "top_3_differentiators": ["Differentiator 1", "Differentiator 2", "Differentiator 3"]
  }}
}}"#,
        keyword = keyword,
        low_block = reviews_block(low_reviews, MAX_REVIEWS_PER_BAND),
        high_block = reviews_block(high_reviews, MAX_REVIEWS_PER_BAND),
    )
}

/// Single-band pain point analysis prompt
pub fn simple_analysis(reviews: &[Review], keyword: &str) -> String {
    format!(
        r#"Analyze the following 1-2 star reviews from the top apps for the keyword "{keyword}".

These are negative reviews from users who are dissatisfied with these apps. Your task is to:

1. Identify common patterns and pain points across these reviews
2. Categorize the main complaints (e.g., UI/UX issues, performance problems, missing features, pricing concerns, etc.)
3. Suggest specific opportunities for a new app that could address these shortcomings
4. Prioritize the opportunities by potential impact and feasibility

Reviews to analyze:

{reviews_block}

Format your response as valid JSON with this structure:
{{
  "summary": "Brief executive summary",
  "patterns": [
    {{
      "category": "Pain point category",
      "description": "What users are complaining about",
      "frequency": "How common this is"
    }}
  ],
  "opportunities": [
    {{
      "title": "Opportunity name",
      "description": "How to address this",
      "priority": "high/medium/low"
    }}
  ]
}}"#,
        keyword = keyword,
        reviews_block = reviews_block(reviews, MAX_REVIEWS_SIMPLE),
    )
}

/// Persona normalization prompt
///
/// Groups raw extracted phrases into named user segments. Only the top
/// phrases by frequency are forwarded; downstream determinism depends on the
/// extractor's stable ordering.
pub fn persona_normalization(
    phrases: &[PersonaPhrase],
    reviews_with_matches: usize,
    keyword: &str,
) -> String {
    let phrases_block = phrases
        .iter()
        .take(MAX_PHRASES_FOR_NORMALIZATION)
        .map(|p| format!("- \"{}\" ({} mentions)", p.phrase, p.count))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"The following self-identifying phrases were extracted from App Store reviews of the top apps for the keyword "{keyword}". {reviews_with_matches} reviews contained at least one phrase.

RAW PHRASES (with mention counts):
{phrases_block}

Group these raw phrases into distinct user personas. Merge synonyms and near-duplicates (e.g. "busy mom" and "working mother" likely belong to one segment). Ignore phrases that do not describe a type of person.

Format your response as valid JSON with this structure:
{{
  "personas": [
    {{
      "name": "Persona name",
      "description": "Who this persona is and what they need",
      "matched_phrases": ["raw phrase 1", "raw phrase 2"],
      "total_mentions": 12
    }}
  ]
}}

Sort personas by total_mentions descending."#,
        keyword = keyword,
        reviews_with_matches = reviews_with_matches,
        phrases_block = phrases_block,
    )
}

/// Insider language mining prompt
///
/// Looks for recurring slang, shorthand, and in-group phrasing that signals
/// community maturity around the category.
pub fn insider_language(low_reviews: &[Review], high_reviews: &[Review], keyword: &str) -> String {
    let mut sample: Vec<&Review> = high_reviews.iter().chain(low_reviews.iter()).collect();
    sample.truncate(MAX_REVIEWS_PER_BAND * 2);

    let reviews_text = sample
        .iter()
        .map(|review| {
            format!(
                "{} {}",
                review.title.as_deref().unwrap_or(""),
                truncate(review.content.as_deref().unwrap_or(""), 200)
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n");

    format!(
        r#"The following are App Store reviews from the top apps for the keyword "{keyword}".

Identify "insider language": recurring slang, shorthand, abbreviations, or in-group phrasing that users of this category share (e.g. community jargon, feature nicknames, workflow terms). This signals how mature the community around this category is.

REVIEWS:
{reviews_text}

Format your response as valid JSON with this structure:
{{
  "terms": [
    {{
      "term": "The term or phrase",
      "meaning": "What it means in this community",
      "example": "A short quote showing usage",
      "frequency": "How often it appears"
    }}
  ],
  "community_maturity": "Assessment of how developed the in-group vocabulary is"
}}"#,
        keyword = keyword,
        reviews_text = reviews_text,
    )
}

fn listing_block(profile: &ListingProfile, description_chars: usize) -> String {
    format!(
        "{}. {} (Rank #{})\n   Subtitle: {}\n   Rating: {}/5 ({} reviews)\n   Description (first {} chars): {}",
        profile.rank,
        profile.name,
        profile.rank,
        profile.subtitle.as_deref().unwrap_or("Not available"),
        profile
            .rating
            .map(|r| format!("{:.1}", r))
            .unwrap_or_else(|| "N/A".to_string()),
        profile.rating_count.unwrap_or(0),
        description_chars,
        truncate(profile.description.as_deref().unwrap_or(""), description_chars),
    )
}

/// ASO recommendations prompt: your listing against ranked competitors
pub fn aso_recommendations(
    target: &ListingProfile,
    competitors: &[ListingProfile],
    keyword: &str,
) -> String {
    let competitors_text = competitors
        .iter()
        .map(|c| listing_block(c, 300))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Analyze the following app metadata and provide ASO recommendations to improve discoverability and conversion for the keyword "{keyword}".

YOUR APP TO OPTIMIZE:
- Name: {name}
- Current Subtitle: {subtitle}
- Current Promotional Text: {promo}
- Rating: {rating}/5 ({rating_count} reviews)
- Description (first 500 chars): {description}

COMPETITOR APPS (ranked by App Store search for "{keyword}"):
{competitors_text}

Provide specific, actionable ASO recommendations. Format as valid JSON:
{{
  "name_recommendations": {{
    "current_analysis": "Analysis of current name effectiveness for the keyword",
    "suggestions": ["suggestion 1", "suggestion 2"],
    "keywords_to_include": ["keyword1", "keyword2"]
  }},
  "subtitle_recommendations": {{
    "current_analysis": "Analysis of current subtitle or lack thereof",
    "suggested_subtitles": ["30-char option 1", "30-char option 2", "30-char option 3"],
    "competitor_patterns": "What successful competitors are doing"
  }},
  "promotional_text_recommendations": {{
    "current_analysis": "Analysis of promotional text effectiveness",
    "suggested_text": "Full 170-character promotional text suggestion",
    "key_themes": ["theme1", "theme2"]
  }},
  "keyword_recommendations": {{
    "primary_keywords": ["high-priority keyword 1", "keyword 2"],
    "secondary_keywords": ["lower-priority keywords"],
    "competitor_keywords": ["keywords competitors use effectively"],
    "gap_keywords": ["keywords competitors miss that you could target"]
  }},
  "description_recommendations": {{
    "current_analysis": "Analysis of description effectiveness",
    "suggested_opening": "Strong first paragraph suggestion (most important for ASO)",
    "key_features_to_highlight": ["feature1", "feature2"],
    "keyword_placement_tips": "Where to place keywords naturally"
  }},
  "competitive_summary": {{
    "your_current_position": "Assessment of where you stand",
    "top_3_priorities": ["Most impactful change 1", "Change 2", "Change 3"],
    "unique_angles": ["Positioning opportunities competitors don't own"]
  }}
}}

IMPORTANT:
- Subtitles MUST be under 30 characters
- Promotional text MUST be under 170 characters
- Base suggestions on gaps you see vs competitors
- Be specific and actionable"#,
        keyword = keyword,
        name = target.name,
        subtitle = target.subtitle.as_deref().unwrap_or("None set"),
        promo = target.promotional_text.as_deref().unwrap_or("None set"),
        rating = target
            .rating
            .map(|r| format!("{:.1}", r))
            .unwrap_or_else(|| "N/A".to_string()),
        rating_count = target.rating_count.unwrap_or(0),
        description = truncate(target.description.as_deref().unwrap_or(""), 500),
        competitors_text = competitors_text,
    )
}

/// Keyword intelligence prompt over competitor metadata
pub fn keyword_intelligence(apps: &[ListingProfile], keyword: &str) -> String {
    let apps_text = apps
        .iter()
        .map(|a| listing_block(a, 500))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Analyze the following competitor app metadata from the App Store search results for "{keyword}" and extract keyword intelligence.

COMPETITOR APPS (ranked by App Store search):
{apps_text}

Your task:

1. **High-frequency keywords**: Identify terms that appear across many competitors' titles, subtitles, and descriptions. These are "table stakes" keywords that signal relevance for this category.

2. **Title keywords**: Extract the exact meaningful terms each competitor puts in their app name (excluding common words like "the", "app", "-", etc.).

3. **Subtitle keywords**: Extract terms from subtitles. These are heavily weighted by the store's search algorithm.

4. **Description keywords**: Identify repeated terms in the first few sentences of descriptions across competitors.

5. **Keyword gaps/opportunities**: Terms that only 1-2 competitors use. These represent lower-competition keyword opportunities.

6. **Suggested keyword field**: Create a prioritized, comma-separated list of keywords optimized for the 100-character keyword field. Do NOT include the app name or category name. Focus on high-value terms not already covered by a title or subtitle.

Format your response as valid JSON:
{{
  "high_frequency_keywords": [
    {{"keyword": "term", "competitor_count": 7, "total_competitors": 10, "found_in": ["App Name 1", "App Name 2"]}}
  ],
  "title_keywords": [
    {{"app_name": "App Name", "keywords": ["keyword1", "keyword2"]}}
  ],
  "subtitle_keywords": [
    {{"app_name": "App Name", "subtitle": "The full subtitle text", "keywords": ["keyword1", "keyword2"]}}
  ],
  "description_keywords": [
    {{"keyword": "term", "competitor_count": 5, "context": "Brief note on how it's used"}}
  ],
  "keyword_gaps": [
    {{"keyword": "term", "used_by_count": 1, "used_by": ["App Name"], "opportunity_note": "Why this is an opportunity"}}
  ],
  "suggested_keyword_field": {{
    "keywords": "comma,separated,keywords,max,100,chars",
    "character_count": 42,
    "rationale": "Brief explanation of prioritization"
  }}
}}

IMPORTANT:
- Only extract real keywords found in the provided metadata
- The suggested keyword field MUST be 100 characters or fewer
- Sort high-frequency keywords by competitor_count descending
- Sort keyword gaps by opportunity (fewest competitors first)
- Be specific and actionable"#,
        keyword = keyword,
        apps_text = apps_text,
    )
}

/// Build the multimodal content for a screenshot analysis request
///
/// `images` holds `(mime_type, base64_data)` pairs in display order.
pub fn screenshot_analysis_content(app_name: &str, images: &[(String, String)]) -> MessageContent {
    let mut parts = vec![ContentPart::text(format!(
        "You are analyzing App Store screenshots for the app '{}'. Please provide:\n\n\
         1. A description of each screenshot in order (what is shown, key features highlighted)\n\
         2. An overall analysis of:\n\
            - Keywords and text used across screenshots\n\
            - Visual style and design patterns\n\
            - Content themes and messaging\n\
            - Target audience insights based on the screenshots\n\n\
         Be specific and detailed in your analysis.",
        app_name
    ))];

    for (index, (mime_type, data)) in images.iter().enumerate() {
        parts.push(ContentPart::text(format!("\nScreenshot {}:", index + 1)));
        parts.push(ContentPart::image_data_uri(mime_type, data));
    }

    MessageContent::Parts(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(app: &str, rating: u8, title: &str, content: &str) -> Review {
        Review {
            review_id: format!("{}-{}", app, title),
            app_id: "1".to_string(),
            app_name: app.to_string(),
            author: None,
            title: Some(title.to_string()),
            content: Some(content.to_string()),
            rating,
            version: None,
            published_at: None,
        }
    }

    #[test]
    fn test_comprehensive_prompt_contains_both_bands() {
        let low = vec![review("AppA", 1, "Broken", "Crashes on launch")];
        let high = vec![review("AppB", 5, "Great", "Love the sleep stories")];

        let prompt = comprehensive_analysis(&low, &high, "meditation");
        assert!(prompt.contains("meditation"));
        assert!(prompt.contains("Crashes on launch"));
        assert!(prompt.contains("sleep stories"));
        assert!(prompt.contains("table_stakes"));
        assert!(prompt.contains("competitive_summary"));
    }

    #[test]
    fn test_review_content_truncated() {
        let long = "x".repeat(500);
        let low = vec![review("AppA", 1, "Long", &long)];
        let prompt = simple_analysis(&low, "meditation");
        assert!(!prompt.contains(&long));
        assert!(prompt.contains(&format!("{}...", "x".repeat(200))));
    }

    #[test]
    fn test_band_limit_applied() {
        let low: Vec<Review> = (0..40)
            .map(|i| review("AppA", 1, &format!("t{}", i), &format!("unique-{}", i)))
            .collect();
        let prompt = comprehensive_analysis(&low, &[], "meditation");
        assert!(prompt.contains("unique-29"));
        assert!(!prompt.contains("unique-30"));
    }

    #[test]
    fn test_persona_normalization_prompt() {
        let phrases = vec![PersonaPhrase {
            phrase: "busy mom".to_string(),
            count: 7,
            review_ids: vec!["r1".to_string()],
        }];
        let prompt = persona_normalization(&phrases, 5, "meditation");
        assert!(prompt.contains("busy mom"));
        assert!(prompt.contains("7 mentions"));
        assert!(prompt.contains("personas"));
    }

    #[test]
    fn test_screenshot_content_parts() {
        let images = vec![("image/png".to_string(), "QUJD".to_string())];
        let content = screenshot_analysis_content("Calm Minds", &images);

        match content {
            MessageContent::Parts(parts) => {
                // intro text, per-image label, image
                assert_eq!(parts.len(), 3);
            }
            MessageContent::Text(_) => panic!("expected parts"),
        }
    }

    #[test]
    fn test_aso_prompt_mentions_constraints() {
        let target = ListingProfile {
            name: "My App".to_string(),
            rank: 0,
            subtitle: None,
            promotional_text: None,
            rating: Some(4.2),
            rating_count: Some(10),
            description: Some("A meditation app".to_string()),
        };
        let competitors = vec![ListingProfile {
            name: "Calm Minds".to_string(),
            rank: 1,
            subtitle: Some("Meditation made simple".to_string()),
            promotional_text: None,
            rating: Some(4.8),
            rating_count: Some(1000),
            description: Some("Guided meditation".to_string()),
        }];

        let prompt = aso_recommendations(&target, &competitors, "meditation");
        assert!(prompt.contains("None set"));
        assert!(prompt.contains("Calm Minds"));
        assert!(prompt.contains("under 30 characters"));
    }
}

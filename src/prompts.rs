//! The fixed classification instruction and response schema.
//!
//! Both are constants of the tool: every analysis sends exactly this prompt
//! so results for different plans are comparable. Tests can inspect them
//! directly without a model.

use crate::model::Category;
use serde_json::{json, Value};

/// Instruction sent with every masterplan image.
pub const CLASSIFICATION_PROMPT: &str = r#"You are an expert landscape architect analysing a landscape masterplan drawing.

Estimate how the total site area shown in the plan is divided between exactly these five land-cover categories:

1. TREES_AND_SHRUBS
   - Tree canopies (existing and proposed), hedgerows, shrub and ornamental planting beds, woodland

2. GREEN_OPEN_SPACE
   - Lawns, amenity grass, meadows, wildflower areas, soft landscaped open space without tree cover

3. PERMEABLE_SURFACES
   - Gravel, bark mulch, permeable or grass-reinforced paving, hoggin paths, water features and rain gardens

4. IMPERMEABLE_SURFACES
   - Buildings and roofs, roads, car parks, asphalt and concrete, sealed paving, hard courts

5. INCIDENTAL_PLAY_AREA
   - Playgrounds, play equipment zones, informal and incidental play spaces, safety surfacing

Rules:
- Use the drawing's legend, hatching and colours to identify each category.
- Map every visible part of the site to the single best-fitting category above. Do not invent other categories.
- Percentages are shares of the total site area and must add up to 100.
- For each category give a short description of what in the plan was counted.
- Omit a category only if it is entirely absent from the plan.

Output ONLY a JSON array, with no surrounding text or code fences. Each element must be an object:
{"category": "<one of the five names above>", "description": "<string>", "percentage": <number>}"#;

/// JSON schema of the expected response, in the OpenAPI subset accepted by
/// Gemini's `responseSchema`.
pub fn response_schema() -> Value {
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "category": {
                    "type": "STRING",
                    "enum": categories,
                    "description": "Land-cover category name."
                },
                "description": {
                    "type": "STRING",
                    "description": "What in the plan was counted for this category."
                },
                "percentage": {
                    "type": "NUMBER",
                    "description": "Share of total site area, 0–100."
                }
            },
            "required": ["category", "description", "percentage"],
            "propertyOrdering": ["category", "description", "percentage"]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_category() {
        for c in Category::ALL {
            assert!(CLASSIFICATION_PROMPT.contains(c.as_str()), "missing {c}");
        }
    }

    #[test]
    fn prompt_demands_bare_json() {
        assert!(CLASSIFICATION_PROMPT.contains("ONLY a JSON array"));
    }

    #[test]
    fn schema_requires_all_three_fields() {
        let schema = response_schema();
        let required = schema["items"]["required"].as_array().unwrap();
        assert_eq!(required.len(), 3);
        assert_eq!(schema["type"], "ARRAY");
        assert_eq!(schema["items"]["properties"]["percentage"]["type"], "NUMBER");
        assert_eq!(
            schema["items"]["properties"]["category"]["enum"]
                .as_array()
                .unwrap()
                .len(),
            5
        );
    }
}

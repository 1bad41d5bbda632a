//! System prompt templates for the agent.

use crate::session::FilterSelection;
use crate::tools::ToolRegistry;

/// Build the system prompt with tool definitions.
pub fn build_system_prompt(tools: &ToolRegistry) -> String {
    let tool_descriptions = tools
        .list_tools()
        .iter()
        .map(|t| format!("- **{}**: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an Islamic Real Estate AI Assistant:
- Provide personalized property recommendations
- Focus on family-friendly and halal-considerate properties
- Understand nuanced user requirements
- Give concise, helpful property insights
- Prioritize mosque proximity and community amenities

## Your Capabilities

You can query the property database with these tools:
{tool_descriptions}

## Rules

1. **Use the tools** - Never invent listings, prices or statistics. Look them up.
2. **Extract criteria from the conversation** - Turn the user's request into tool arguments. Leave out anything the user did not ask for.
3. **Recover from tool errors** - If a tool reports an invalid argument, fix the argument and try again. If nothing matches, say so and suggest relaxing a constraint.
4. **Be concise** - Summarize the best matches with location, bedrooms, bathrooms, price, mosque proximity and halal financing availability."#,
        tool_descriptions = tool_descriptions
    )
}

/// Describe the sidebar filters for the model.
pub fn build_filter_context(filters: &FilterSelection) -> String {
    let location = match filters.location.trim() {
        "" => "Not Specified",
        other => other,
    };
    let required = |on: bool| if on { "Required" } else { "Optional" };
    let property_type = filters
        .property_type
        .map(|t| t.label())
        .unwrap_or("Any");

    format!(
        "Property Search Details:\n\
         Location: {location}\n\
         Max Budget: ${max_price}\n\
         Min Bedrooms: {beds}\n\
         Min Bathrooms: {baths}\n\
         Mosque Proximity: {mosque}\n\
         Halal Financing: {halal}\n\
         Property Type: {property_type}\n\n\
         Apply these constraints to any property search unless the user explicitly overrides them.",
        max_price = filters.max_price,
        beds = filters.min_bedrooms,
        baths = filters.min_bathrooms,
        mosque = required(filters.near_mosque),
        halal = required(filters.halal_financing),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::sample_store;
    use crate::store::PropertyType;

    #[tokio::test]
    async fn system_prompt_lists_every_tool() {
        let (_dir, store) = sample_store();
        let tools = ToolRegistry::new(store);
        let prompt = build_system_prompt(&tools);
        for tool in tools.list_tools() {
            assert!(prompt.contains(&tool.name), "missing {}", tool.name);
        }
    }

    #[test]
    fn filter_context_spells_out_requirements() {
        let filters = FilterSelection {
            near_mosque: true,
            halal_financing: false,
            property_type: Some(PropertyType::Condo),
            ..Default::default()
        };
        let context = build_filter_context(&filters);
        assert!(context.contains("Location: Sacramento"));
        assert!(context.contains("Max Budget: $500000"));
        assert!(context.contains("Mosque Proximity: Required"));
        assert!(context.contains("Halal Financing: Optional"));
        assert!(context.contains("Property Type: Condo"));
    }
}

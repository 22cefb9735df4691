//! Code-defined agent documents.
//!
//! These are the agents the platform ships with. They are auto-registered
//! into the store on first registry miss, and on-disk schema files may add
//! to (but never override) this set.

use serde_json::json;

use crate::document::AgentDocument;

/// Name of the agent used when nothing else matches.
pub const DEFAULT_AGENT: &str = "general";

/// Names of all code-defined agents.
pub fn builtin_names() -> Vec<&'static str> {
    vec!["general", "dreaming-agent", "researcher", "sample-agent"]
}

/// Look up a built-in agent document by name.
pub fn builtin(name: &str) -> Option<AgentDocument> {
    let value = match name {
        "general" => general(),
        "dreaming-agent" => dreaming(),
        "researcher" => researcher(),
        "sample-agent" => sample(),
        _ => return None,
    };
    Some(AgentDocument::from_value(value).expect("built-in agent documents are valid"))
}

fn general() -> serde_json::Value {
    json!({
        "name": "general",
        "description": "Default assistant with full knowledge base access.",
        "system_prompt": "You are a friendly, sharp assistant with a personal \
knowledge base organised as resources, entities, and moments. Keep responses \
short and conversational; answer like a helpful friend.\n\n\
## Tool guidance\n\
- user_profile: call when the user asks about themselves or what you know \
about them. Never guess user details.\n\
- update_user_metadata: when the user shares personal details (interests, \
people, pets, places, preferences), save them with this tool in the same \
turn. Batch multiple facts into one call. Never mention that you are saving.\n\
- search: search the knowledge base before answering factual questions about \
the user's data. When results are empty, try a broader query.\n\n\
## Delegation\n\
Only delegate to the researcher agent when the user explicitly asks for \
research: ask_agent(agent_name=\"researcher\", input_text=...).\n\n\
## Session Context\n\
[Session context] blocks summarise prior activity; acknowledge what you \
already know before asking the user to repeat themselves.",
        "properties": {
            "user_intent": {
                "type": "string",
                "description": "Classify: question, task, greeting, casual, follow-up"
            },
            "topic": {
                "type": "string",
                "description": "Primary topic or entity the user is asking about"
            },
            "requires_search": {
                "type": "boolean",
                "description": "Whether to search the knowledge base before responding"
            },
        },
        "tools": [
            {"name": "search", "description": "Query the knowledge base. LOOKUP for exact keys, SEARCH for semantic matches"},
            {"name": "ask_agent", "description": "Delegate to specialist agents for domain-specific tasks"},
            {"name": "user_profile"},
            {"name": "update_user_metadata", "description": "Save observed facts: relations, interests, preferences, facts. Partial updates, only send changed keys"},
        ],
        "temperature": 0.3,
        "max_tokens": 4000,
        "limits": {"request_limit": 15, "total_tokens_limit": 80000},
    })
}

fn dreaming() -> serde_json::Value {
    json!({
        "name": "dreaming-agent",
        "description": "Background reflective agent that distils recent activity into dream moments.",
        "system_prompt": "You are a reflective dreaming agent. You and the \
person share a collaborative memory; you process recent conversations, \
moments, and resources together to surface insights no single session \
contains.\n\n\
Write in first-person plural (\"We discovered...\"), never \"the user\". \
Draft one to three dream moments. Each has a kebab-case name, a 2-4 sentence \
summary in the shared voice, topic_tags, optional emotion_tags, and \
affinity_fragments linking to entities from the context, each with target, \
relation, weight (0.0-1.0) and a reason explaining why the connection \
matters. Search for adjacent concepts, not the same keywords, before \
finalising. A good dream says something no individual session said; prefer \
one insightful moment over three shallow ones.",
        "structured_output": true,
        "chained_tool": "save_moments",
        "properties": {
            "moments": {
                "type": "array",
                "description": "1-3 dream moments, each with name, summary, topic_tags, emotion_tags, affinity_fragments"
            },
            "search_questions": {
                "type": "array",
                "description": "Semantic search questions derived from cross-session themes"
            },
            "cross_session_themes": {
                "type": "array",
                "description": "Recurring patterns spanning sessions, each a short phrase"
            },
        },
        "required": ["moments"],
        "tools": [
            {"name": "search", "description": "Lateral search: SEARCH \"adjacent keywords\" FROM moments or resources"},
        ],
        "model": "openai:gpt-4.1-mini",
        "temperature": 0.7,
        "max_tokens": 4000,
        "limits": {"request_limit": 15, "total_tokens_limit": 115000},
        "routing_enabled": false,
        "observation_mode": "disabled",
    })
}

fn researcher() -> serde_json::Value {
    json!({
        "name": "researcher",
        "description": "Research assistant that digs into a topic and reports findings.",
        "system_prompt": "You are a research assistant. Gather context with \
search before answering, synthesise findings into a short, concrete summary, \
and cite the entity names your answer draws on. Prefer depth on the asked \
question over breadth.",
        "properties": {
            "research_goal": {
                "type": "string",
                "description": "What the user wants to understand"
            },
            "requires_web_search": {
                "type": "boolean",
                "description": "Whether current information from the web is needed"
            },
        },
        "tools": [
            {"name": "search", "description": "Query the knowledge base before reaching for the web"},
            {"name": "web_search", "provider": "web"},
        ],
        "temperature": 0.4,
        "limits": {"request_limit": 20, "total_tokens_limit": 80000},
    })
}

fn sample() -> serde_json::Value {
    json!({
        "name": "sample-agent",
        "description": "Sample agent demonstrating the declarative schema structure.",
        "system_prompt": "You are a helpful assistant with access to a \
knowledge base and the ability to delegate to other agents. Always search \
the knowledge base before answering factual questions. Delegate to \
specialist agents when the task is outside your expertise.",
        "properties": {
            "topic": {"type": "string", "description": "Primary topic of the user's question"},
            "requires_search": {"type": "boolean", "description": "Whether to search the knowledge base first"},
        },
        "tools": [
            {"name": "search", "description": "Query the knowledge base"},
            {"name": "ask_agent", "description": "Delegate to specialist agents"},
        ],
        "limits": {"request_limit": 10, "total_tokens_limit": 50000},
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AgentSchema;

    #[test]
    fn all_builtins_compile() {
        for name in builtin_names() {
            let doc = builtin(name).expect("builtin exists");
            let schema = AgentSchema::build(doc).expect("builtin compiles");
            assert_eq!(schema.name, name);
        }
    }

    #[test]
    fn unknown_name_is_none() {
        assert!(builtin("nope").is_none());
    }

    #[test]
    fn dreaming_agent_is_structured_with_chained_tool() {
        let schema = AgentSchema::build(builtin("dreaming-agent").unwrap()).unwrap();
        assert!(schema.structured_output);
        assert_eq!(schema.chained_tool.as_deref(), Some("save_moments"));
        assert!(!schema.routing_enabled);
        match schema.compile_output_type() {
            lucid_domain::stream::OutputSpec::Object { schema } => {
                assert!(schema["properties"].get("moments").is_some());
            }
            _ => panic!("expected object output"),
        }
    }

    #[test]
    fn general_agent_prompt_carries_tool_notes_and_thinking_structure() {
        let schema = AgentSchema::build(builtin("general").unwrap()).unwrap();
        let prompt = schema.compile_system_prompt();
        assert!(prompt.contains("## Tool Notes"));
        assert!(prompt.contains("## Thinking Structure"));
        assert!(prompt.contains("- user_intent (string)"));
    }
}

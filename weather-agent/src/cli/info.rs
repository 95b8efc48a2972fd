use clap::{Args, ValueEnum};
use serde_json::json;

use crate::agent::router::RouterTool;
use crate::config::AgentMode;
use crate::constant::{DEFAULT_MODEL, NAME, VERSION};
use crate::tools::LLM_TOOL_NAMES;

#[derive(Args, Debug)]
#[command(about = "Show version, modes and tools.")]
pub struct InfoArgs {
    #[arg(long = "json", help = "Output information as JSON.")]
    pub json_output: bool,
}

pub fn run_info_command(args: InfoArgs) {
    let modes = AgentMode::value_variants()
        .iter()
        .map(|mode| mode.as_str())
        .collect::<Vec<_>>();
    let router_tools = RouterTool::ALL
        .iter()
        .map(|tool| tool.name())
        .collect::<Vec<_>>();
    if args.json_output {
        let payload = json!({
            "name": NAME,
            "version": VERSION,
            "modes": modes,
            "default_model": DEFAULT_MODEL,
            "router_tools": router_tools,
            "llm_tools": LLM_TOOL_NAMES,
        });
        println!("{payload}");
        return;
    }

    println!("weather-agent version: {VERSION}");
    println!("modes: {}", modes.join(", "));
    println!("default model: {DEFAULT_MODEL}");
    println!("router tools: {}", router_tools.join(", "));
    println!("llm tools: {}", LLM_TOOL_NAMES.join(", "));
}

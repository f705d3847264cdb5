use std::fs;

fn main() -> anyhow::Result<()> {
    // Generate the OpenAPI document the same way the server does at startup.
    let doc = munidesk::docs::build_openapi(8000)?;
    let json = serde_json::to_string_pretty(&doc)?;
    let path = "/tmp/munidesk-openapi.json";
    fs::write(path, json)?;
    println!("wrote {}", path);
    Ok(())
}

use anyhow::{Context, Result};
use std::path::Path;

const DEFAULT_CONFIG: &str = "[project]
name = \"\"

[agent]
# preferred = \"claude\"
";

const GITIGNORE: &str = "board.db\nboard.db-wal\nboard.db-shm\nserver.json\nlogs/\n";

pub fn run() -> Result<()> {
    run_in(Path::new("."))
}

pub fn run_in(base: &Path) -> Result<()> {
    let dir = base.join(".crewboard");
    std::fs::create_dir_all(&dir).context("creating .crewboard directory")?;

    let config_path = dir.join("config.toml");
    if config_path.exists() {
        println!("{} already exists, skipping", config_path.display());
    } else {
        std::fs::write(&config_path, DEFAULT_CONFIG).context("writing config")?;
    }

    std::fs::write(dir.join(".gitignore"), GITIGNORE).context("writing gitignore")?;

    println!("Initialized crewboard in {}", dir.display());
    Ok(())
}

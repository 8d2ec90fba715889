use anyhow::Result;
use clap::Args;
use serde_json::json;

#[derive(Args, Debug)]
pub struct PeersArgs {
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: PeersArgs) -> Result<()> {
    match crewboard_peer::read_server_info() {
        Ok(info) => {
            if args.json {
                println!("{}", json!({"addr": info.addr}));
            } else {
                println!("Local hub advertised at {}", info.addr);
                println!("Join with: crewboard --connect {}", info.addr);
            }
        }
        Err(_) => {
            if args.json {
                println!("{}", json!({"addr": null}));
            } else {
                println!("No local hub advertised; start one with `crewboard serve`");
            }
        }
    }
    Ok(())
}

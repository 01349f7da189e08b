use std::io::{self, Write};

use bby_client::{
    Api, BbyClient, EqType, Prefs, StepContext, compute_next_colours, hex_to_rgb, spawn_visualizer,
};

const PREFS_PATH: &str = "bby_prefs.json";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let prefs = Prefs::load(PREFS_PATH);
    let client = BbyClient::new(Api::new(), prefs);

    client.start();
    spawn_visualizer(client.clone());

    println!("\n╭──────────────────────────────────────────╮");
    println!("│        bby client — remote mirror        │");
    println!("│                                          │");
    println!("│ anything you type is said to bby         │");
    println!("│                                          │");
    println!("│ /name <name>     - set display name      │");
    println!("│ /colour <hex>    - set your colour       │");
    println!("│ /paint <x> <y>   - paint one pixel       │");
    println!("│ /fact            - say a random bbyfact  │");
    println!("│ /preview <n>     - next brush colours    │");
    println!("│ /state           - show mirror state     │");
    println!("│ /snap <label>    - upload composite      │");
    println!("│ /gallery <label> - save to gallery       │");
    println!("│ /clear           - clear bubbles+ghosts  │");
    println!("│ /quit                                    │");
    println!("╰──────────────────────────────────────────╯\n");

    loop {
        print!("you: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        if input.is_empty() { continue; }

        if let Some(rest) = input.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            match parts.next().unwrap_or("") {
                "quit" => break,
                "name" => match parts.next() {
                    Some(name) => {
                        client.set_username(name, PREFS_PATH);
                        println!("hello, {name}\n");
                    }
                    None => println!("usage: /name <name>\n"),
                },
                "colour" | "color" => match parts.next().and_then(hex_to_rgb) {
                    Some(c) => {
                        client.set_user_colour(c, PREFS_PATH);
                        println!("colour set to {} {} {}\n", c.r, c.g, c.b);
                    }
                    None => println!("usage: /colour #rrggbb\n"),
                },
                "paint" => {
                    let x = parts.next().and_then(|s| s.parse().ok());
                    let y = parts.next().and_then(|s| s.parse().ok());
                    match (x, y) {
                        (Some(x), Some(y)) => client.paint_pixel(x, y).await,
                        _ => println!("usage: /paint <x> <y>\n"),
                    }
                }
                "fact" => {
                    if let Err(e) = client.say_random_fact().await {
                        println!("couldn't reach bby: {e}\n");
                    }
                }
                "preview" => {
                    let n: usize = parts.next().and_then(|s| s.parse().ok()).unwrap_or(8);
                    let seed = client.current_colour.lock().unwrap().rounded();
                    let mut ctx = StepContext {
                        user_colour: client.prefs.lock().unwrap().user_colour(),
                        bby_colour: *client.target_colour.lock().unwrap(),
                        ..StepContext::default()
                    };
                    ctx.active_eqs.insert(EqType::User);
                    ctx.active_eqs.insert(EqType::Rainbow);
                    ctx.user_influence = 40.0;
                    ctx.rainbow_influence = 60.0;
                    for (i, c) in compute_next_colours(n, seed, &ctx).iter().enumerate() {
                        println!("{:>3}. #{:02x}{:02x}{:02x}", i + 1, c.r, c.g, c.b);
                    }
                    println!();
                }
                "state" => {
                    let mirror = client.mirror.lock().unwrap().clone();
                    let colour = client.current_colour.lock().unwrap().rounded();
                    println!("{mirror:#?}");
                    println!("ambient colour: {} {} {}\n", colour.r, colour.g, colour.b);
                }
                "snap" => {
                    let label = parts.collect::<Vec<_>>().join(" ");
                    match client.save_snapshot(&label).await {
                        Ok(()) => println!("snapshot sent\n"),
                        Err(e) => println!("snapshot failed: {e}\n"),
                    }
                }
                "gallery" => {
                    let label = parts.collect::<Vec<_>>().join(" ");
                    match client.save_to_gallery(&label).await {
                        Ok(()) => println!("saved to gallery\n"),
                        Err(e) => println!("gallery save failed: {e}\n"),
                    }
                }
                "clear" => {
                    client.clear_bubbles();
                    println!("bubbles cleared\n");
                }
                other => println!("unknown command: /{other}\n"),
            }
            continue;
        }

        // plain text goes straight to bby
        if let Err(e) = client.say(input).await {
            println!("bby didn't hear you: {e}\n");
        }
    }

    Ok(())
}

use std::rc::Rc;
use tankscape::config::{ArenaConfig, BoxShapes};
use tankscape::interval::Interval;
use tankscape::logger::Logger;
use tankscape::sink::LogSink;
use tankscape::Arena;

fn main() -> anyhow::Result<()> {
    Logger::init(log::LevelFilter::Debug);

    let config = match std::env::args().nth(1) {
        Some(path) => ArenaConfig::load(&path)?,
        None => ArenaConfig::default(),
    };
    log::info!(
        "starting arena: {} tanks, seed {}",
        config.tanks.len(),
        config.seed
    );

    let shapes = BoxShapes::new(&config);
    let sink = Rc::new(LogSink);
    let mut arena = Arena::new(&config, &shapes, sink.clone(), sink)?;

    let mut interval = Interval::new(Arena::TICK_DURATION, Arena::TICK_DURATION * 5);
    loop {
        arena.step();

        if arena.tick % 250 == 0 {
            log::info!(
                "tick {}: {} tanks alive, {} bullets in flight",
                arena.tick,
                arena.alive_tanks(),
                arena.bullets.live_count()
            );
        }

        if arena.alive_tanks() <= 1 {
            match arena.tanks.iter().position(|tank| tank.alive) {
                Some(index) => log::info!("tank {} wins after {} ticks", index, arena.tick),
                None => log::info!("mutual destruction after {} ticks", arena.tick),
            }
            break;
        }

        interval.step();
    }

    Ok(())
}

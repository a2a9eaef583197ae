//! Fleet Wars Server
//!
//! Runs the WebSocket gateway over an in-process ledger, or with `--demo`
//! plays one scripted delegated match and verifies its journal.

use std::sync::Arc;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fleet_wars::{
    VERSION,
    core::cell::{Cell, BOARD_CELLS},
    game::{fleet::BoardSecret, state::{GameState, Side}, Instruction},
    ledger::{replay, Ledger, LedgerConfig, Route},
    network::{GatewayServer, ServerConfig},
    Pubkey,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Fleet Wars Server v{}", VERSION);
    let ledger_config = LedgerConfig::from_env();
    info!(
        "Turn timeout: {} slots, reveal timeout: {} slots, slot: {:?}",
        ledger_config.turn_timeout_slots, ledger_config.reveal_timeout_slots, ledger_config.slot_duration
    );

    if std::env::args().any(|arg| arg == "--demo") {
        return demo_match(ledger_config).await;
    }

    let ledger = Arc::new(Ledger::new(ledger_config));
    let server = Arc::new(GatewayServer::new(ServerConfig::from_env(), ledger));

    let signal = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            signal.shutdown();
        }
    });

    server.run().await.context("gateway failed")?;
    Ok(())
}

fn seat(side: Side) -> usize {
    match side {
        Side::Player1 => 0,
        Side::Player2 => 1,
    }
}

/// Scripted match: create, join, delegate, play honestly until a fleet
/// sinks, reveal, finalize, then replay the journal.
async fn demo_match(config: LedgerConfig) -> anyhow::Result<()> {
    info!("=== Starting Demo Match ===");

    let ledger = Ledger::new(config);
    let mut rng = StdRng::from_entropy();
    let aux = Route::Auxiliary { validator: ledger.config().default_validator };

    let players = [Pubkey::from_label("demo-admiral-1"), Pubkey::from_label("demo-admiral-2")];
    let secrets = [BoardSecret::generate(&mut rng), BoardSecret::generate(&mut rng)];
    let wager = 250_000;
    let nonce: u64 = rng.gen();

    for (player, secret) in players.iter().zip(&secrets) {
        ledger.airdrop(player, 1_000_000).await?;
        info!("Player {} fleet: {:?}", player.short(), secret);
    }

    let game = ledger
        .submit(Route::Base, players[0], Instruction::CreateGame {
            nonce,
            commit_hash: secrets[0].commitment(),
            wager,
        })
        .await?
        .game;
    ledger
        .submit(Route::Base, players[1], Instruction::JoinGame {
            game,
            commit_hash: secrets[1].commitment(),
            wager,
        })
        .await?;
    ledger
        .submit(Route::Base, players[0], Instruction::Delegate { nonce, validator: None })
        .await?;
    info!("Game {} delegated, playing through the auxiliary executor", game.short());

    let mut shots = 0u32;
    loop {
        let record = ledger.get_game(&game).await.context("game record vanished")?.game;
        if record.game_state != GameState::Active {
            break;
        }

        let side = record.turn_state.actor();
        let instruction = if record.turn_state.is_firing() {
            let fired = record.shots(side);
            let open: Vec<u8> = (0..BOARD_CELLS)
                .filter(|i| Cell::new(*i).is_some_and(|cell| !fired.contains(cell)))
                .collect();
            let cell = *open.choose(&mut rng).context("no cells left to fire at")?;
            shots += 1;
            Instruction::FireShot { game, cell }
        } else {
            let cell = record.last_shot_cell().context("no shot to answer")?;
            Instruction::RespondShot { game, hit: secrets[seat(side)].cells().contains(cell) }
        };

        ledger.submit(aux, players[seat(side)], instruction).await?;
        ledger.tick();
    }
    info!("Fleet sunk after {} shots", shots);

    for (player, secret) in players.iter().zip(&secrets) {
        ledger
            .submit(Route::Base, *player, Instruction::RevealBoard {
                game,
                board: secret.board,
                salt: secret.salt,
            })
            .await?;
    }

    let receipt = ledger.submit(Route::Base, players[0], Instruction::Finalize { game }).await?;
    let snapshot = ledger.get_game(&game).await.context("game record vanished")?;
    info!("=== Match Results ===");
    info!("Winner: {:?}", snapshot.game.winner);
    if let Some(payout) = receipt.payout {
        info!("Paid {} to {}", payout.amount, payout.payee.short());
    }
    for player in &players {
        info!("Balance of {}: {}", player.short(), ledger.balance(player).await);
    }

    info!("=== Verifying Journal ===");
    let journal = ledger.journal(&game).await.context("journal missing")?;
    let report = replay(&journal)?;
    anyhow::ensure!(Some(report.final_hash) == journal.last_hash(), "replay diverged from the ledger");
    info!(
        "Replayed {} entries, final state hash {}",
        report.entries,
        hex::encode(report.final_hash)
    );

    Ok(())
}

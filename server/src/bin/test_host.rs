use bincode::{deserialize, serialize};
use shared::Packet;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

/// Headless admin client: claims a session, starts it, and advances through
/// every question on a fixed cadence. Pairs with `test_client` for driving a
/// full session against a running server.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let code = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ABCD1".to_string());

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Host socket bound to {}", socket.local_addr()?);

    let server_addr = "127.0.0.1:5000".parse::<SocketAddr>()?;

    let host_packet = Packet::HostSession { code: code.clone() };
    println!("Claiming session {}", code);
    socket.send_to(&serialize(&host_packet)?, server_addr).await?;

    let mut buf = [0u8; 2048];
    let (len, _) = socket.recv_from(&mut buf).await?;
    let question_count = match deserialize::<Packet>(&buf[0..len])? {
        Packet::SessionHosted { code, quiz } => {
            println!("Hosting '{}' ({} questions) as {}", quiz.title, quiz.question_count, code);
            quiz.question_count
        }
        Packet::SessionError { message } => {
            println!("Server rejected us: {}", message);
            return Ok(());
        }
        other => {
            println!("Unexpected packet: {:?}", other);
            return Ok(());
        }
    };

    // Give players a window to join before starting
    println!("Starting in 10s...");
    sleep(Duration::from_secs(10)).await;
    socket
        .send_to(
            &serialize(&Packet::AdminStart { code: code.clone() })?,
            server_addr,
        )
        .await?;

    // Advance once per question (the extra advance past the last question
    // ends the session), draining pushes in between
    for _ in 0..question_count {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
        while tokio::time::Instant::now() < deadline {
            if let Ok(Ok((len, _))) =
                timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await
            {
                if let Ok(packet) = deserialize::<Packet>(&buf[0..len]) {
                    println!("{:?}", packet);
                }
            }
        }
        socket
            .send_to(
                &serialize(&Packet::AdminAdvance { code: code.clone() })?,
                server_addr,
            )
            .await?;
    }

    // Wait for the final standings
    loop {
        let (len, _) = socket.recv_from(&mut buf).await?;
        match deserialize::<Packet>(&buf[0..len]) {
            Ok(Packet::SessionEnded {
                final_leaderboard, ..
            }) => {
                println!("Final standings:");
                for entry in final_leaderboard {
                    println!("  {}. {}: {}", entry.position, entry.name, entry.score);
                }
                break;
            }
            Ok(packet) => println!("{:?}", packet),
            Err(e) => println!("Failed to deserialize packet: {}", e),
        }
    }

    println!("Test host finished");
    Ok(())
}

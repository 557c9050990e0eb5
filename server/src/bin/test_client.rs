use bincode::{deserialize, serialize};
use shared::Packet;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::timeout;

// Get current timestamp in milliseconds
fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Headless player client: joins a session, answers every question with
/// option 0, and prints everything the server pushes at it. Handy for
/// poking a running server without a real frontend.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let code = args.next().unwrap_or_else(|| "ABCD1".to_string());
    let name = args.next().unwrap_or_else(|| "test-player".to_string());

    // Create local socket
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let server_addr = "127.0.0.1:5000".parse::<SocketAddr>()?;

    let join_packet = Packet::JoinSession {
        code: code.clone(),
        name: name.clone(),
    };
    println!("Joining session {} as {}", code, name);
    socket.send_to(&serialize(&join_packet)?, server_addr).await?;

    let mut buf = [0u8; 2048];
    let mut heartbeat_due = tokio::time::Instant::now() + Duration::from_secs(5);

    loop {
        let packet = match timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => match deserialize::<Packet>(&buf[0..len]) {
                Ok(packet) => Some(packet),
                Err(e) => {
                    println!("Failed to deserialize packet: {}", e);
                    None
                }
            },
            Ok(Err(e)) => {
                println!("Error receiving packet: {}", e);
                None
            }
            Err(_) => None, // recv timeout, fall through to heartbeat
        };

        match packet {
            Some(Packet::JoinedSession { quiz, player_id }) => {
                println!(
                    "Joined '{}' ({} questions, {} points) as {}",
                    quiz.title, quiz.question_count, quiz.total_points, player_id
                );
            }
            Some(Packet::SessionError { message }) => {
                println!("Server rejected us: {}", message);
                break;
            }
            Some(Packet::PlayerJoined {
                name,
                total_players,
            }) => {
                println!("{} joined ({} players)", name, total_players);
            }
            Some(Packet::QuestionStart {
                index,
                total,
                prompt,
                options,
                points,
                time_limit_secs,
            }) => {
                println!(
                    "Question {}/{} ({} pts, {}s): {}",
                    index + 1,
                    total,
                    points,
                    time_limit_secs,
                    prompt
                );
                for (i, option) in options.iter().enumerate() {
                    println!("  [{}] {}", i, option);
                }

                // Always answer option 0, claiming most of the window left
                let answer = Packet::SubmitAnswer {
                    answer: 0,
                    time_remaining: time_limit_secs as f32 - 1.0,
                };
                socket.send_to(&serialize(&answer)?, server_addr).await?;
            }
            Some(Packet::AnswerResult {
                is_correct,
                points,
                correct_option,
            }) => {
                println!(
                    "Answer was {} ({} pts, correct option was {})",
                    if is_correct { "correct" } else { "wrong" },
                    points,
                    correct_option
                );
            }
            Some(Packet::QuestionEnd {
                index,
                correct_option,
            }) => {
                println!("Question {} closed, answer was [{}]", index + 1, correct_option);
            }
            Some(Packet::LeaderboardUpdate { entries }) => {
                println!("Leaderboard:");
                for entry in entries {
                    println!("  {}: {}", entry.name, entry.score);
                }
            }
            Some(Packet::PlayerList { players }) => {
                println!(
                    "Roster: {}",
                    players
                        .iter()
                        .map(|p| p.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            Some(Packet::SessionEnded {
                final_leaderboard,
                total_questions,
            }) => {
                println!("Session over after {} questions. Final standings:", total_questions);
                for entry in final_leaderboard {
                    println!("  {}. {}: {}", entry.position, entry.name, entry.score);
                }
                socket
                    .send_to(&serialize(&Packet::LeaveSession)?, server_addr)
                    .await?;
                break;
            }
            Some(other) => println!("Unexpected packet: {:?}", other),
            None => {}
        }

        if tokio::time::Instant::now() >= heartbeat_due {
            let heartbeat = Packet::Heartbeat {
                timestamp: get_timestamp(),
            };
            socket.send_to(&serialize(&heartbeat)?, server_addr).await?;
            heartbeat_due = tokio::time::Instant::now() + Duration::from_secs(5);
        }
    }

    println!("Test client finished");
    Ok(())
}

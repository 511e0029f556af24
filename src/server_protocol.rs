use serde_json::Value;

/// Inbound client events, one variant per wire `type`. Malformed frames
/// parse to `None` and are dropped by the gateway; the client is never
/// disconnected over a bad frame.
#[derive(Debug)]
pub enum ParsedClientMessage {
    JoinRace {
        player_id: String,
        address: String,
    },
    UpdateHeight {
        race_id: u64,
        player_id: String,
        height: f64,
    },
    ApplyPowerUp {
        race_id: u64,
        player_id: String,
        power_up_type: String,
        target_player_id: Option<String>,
    },
    PlayerPosition {
        race_id: u64,
        player_id: String,
        x: f64,
        y: f64,
        score: f64,
        velocity_y: f64,
        alive: bool,
    },
    PlayerDied {
        race_id: u64,
        player_id: String,
        final_score: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "joinRace" => {
            let player_id = object.get("playerId")?.as_str()?.to_string();
            let address = match object.get("address") {
                None => String::new(),
                Some(value) => value.as_str()?.to_string(),
            };
            Some(ParsedClientMessage::JoinRace { player_id, address })
        }
        "updateHeight" => {
            let race_id = object.get("raceId")?.as_u64()?;
            let player_id = object.get("playerId")?.as_str()?.to_string();
            let height = parse_finite_f64(object.get("height"))?;
            Some(ParsedClientMessage::UpdateHeight {
                race_id,
                player_id,
                height,
            })
        }
        "applyPowerUp" => {
            let race_id = object.get("raceId")?.as_u64()?;
            let player_id = object.get("playerId")?.as_str()?.to_string();
            let power_up_type = object.get("powerUpType")?.as_str()?.to_string();
            let target_player_id = match object.get("targetPlayerId") {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.as_str()?.to_string()),
            };
            Some(ParsedClientMessage::ApplyPowerUp {
                race_id,
                player_id,
                power_up_type,
                target_player_id,
            })
        }
        "playerPosition" => {
            let race_id = object.get("raceId")?.as_u64()?;
            let player_id = object.get("playerId")?.as_str()?.to_string();
            let x = parse_finite_f64(object.get("x"))?;
            let y = parse_finite_f64(object.get("y"))?;
            let score = parse_finite_f64(object.get("score"))?;
            let velocity_y = parse_finite_f64(object.get("velocityY"))?;
            let alive = object.get("alive")?.as_bool()?;
            Some(ParsedClientMessage::PlayerPosition {
                race_id,
                player_id,
                x,
                y,
                score,
                velocity_y,
                alive,
            })
        }
        "playerDied" => {
            let race_id = object.get("raceId")?.as_u64()?;
            let player_id = object.get("playerId")?.as_str()?.to_string();
            let final_score = parse_finite_f64(object.get("finalScore"))?;
            Some(ParsedClientMessage::PlayerDied {
                race_id,
                player_id,
                final_score,
            })
        }
        _ => None,
    }
}

fn parse_finite_f64(value: Option<&Value>) -> Option<f64> {
    let number = value?.as_f64()?;
    if !number.is_finite() {
        return None;
    }
    Some(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_join_race_message() {
        let parsed =
            parse_client_message(r#"{"type":"joinRace","playerId":"p1","address":"0xabc"}"#)
                .expect("joinRace should parse");
        match parsed {
            ParsedClientMessage::JoinRace { player_id, address } => {
                assert_eq!(player_id, "p1");
                assert_eq!(address, "0xabc");
            }
            _ => panic!("expected joinRace message"),
        }
    }

    #[test]
    fn parse_join_race_without_address() {
        let parsed = parse_client_message(r#"{"type":"joinRace","playerId":"p1"}"#)
            .expect("joinRace should parse");
        assert!(matches!(
            parsed,
            ParsedClientMessage::JoinRace { address, .. } if address.is_empty()
        ));
    }

    #[test]
    fn parse_update_height_message() {
        let parsed = parse_client_message(
            r#"{"type":"updateHeight","raceId":3,"playerId":"p1","height":152.5}"#,
        )
        .expect("updateHeight should parse");
        match parsed {
            ParsedClientMessage::UpdateHeight {
                race_id,
                player_id,
                height,
            } => {
                assert_eq!(race_id, 3);
                assert_eq!(player_id, "p1");
                assert_eq!(height, 152.5);
            }
            _ => panic!("expected updateHeight message"),
        }
    }

    #[test]
    fn parse_update_height_rejects_non_finite_height() {
        let parsed = parse_client_message(
            r#"{"type":"updateHeight","raceId":3,"playerId":"p1","height":1e999}"#,
        );
        assert!(parsed.is_none());
    }

    #[test]
    fn parse_update_height_rejects_negative_race_id() {
        let parsed = parse_client_message(
            r#"{"type":"updateHeight","raceId":-1,"playerId":"p1","height":10}"#,
        );
        assert!(parsed.is_none());
    }

    #[test]
    fn parse_apply_power_up_message() {
        let parsed = parse_client_message(
            r#"{"type":"applyPowerUp","raceId":1,"playerId":"p1","powerUpType":"glue","targetPlayerId":"p2"}"#,
        )
        .expect("applyPowerUp should parse");
        assert!(matches!(
            parsed,
            ParsedClientMessage::ApplyPowerUp {
                target_player_id: Some(ref target),
                ..
            } if target == "p2"
        ));
    }

    #[test]
    fn parse_apply_power_up_with_null_target() {
        let parsed = parse_client_message(
            r#"{"type":"applyPowerUp","raceId":1,"playerId":"p1","powerUpType":"boost","targetPlayerId":null}"#,
        )
        .expect("applyPowerUp should parse");
        assert!(matches!(
            parsed,
            ParsedClientMessage::ApplyPowerUp {
                target_player_id: None,
                ..
            }
        ));
    }

    #[test]
    fn parse_player_position_message() {
        let parsed = parse_client_message(
            r#"{"type":"playerPosition","raceId":2,"playerId":"p1","x":120.0,"y":-340.5,"score":340.5,"velocityY":-9.8,"alive":true}"#,
        )
        .expect("playerPosition should parse");
        match parsed {
            ParsedClientMessage::PlayerPosition {
                race_id, y, alive, ..
            } => {
                assert_eq!(race_id, 2);
                assert_eq!(y, -340.5);
                assert!(alive);
            }
            _ => panic!("expected playerPosition message"),
        }
    }

    #[test]
    fn parse_player_position_requires_alive_flag() {
        let parsed = parse_client_message(
            r#"{"type":"playerPosition","raceId":2,"playerId":"p1","x":1,"y":2,"score":3,"velocityY":4}"#,
        );
        assert!(parsed.is_none());
    }

    #[test]
    fn parse_player_died_message() {
        let parsed = parse_client_message(
            r#"{"type":"playerDied","raceId":2,"playerId":"p1","finalScore":512}"#,
        )
        .expect("playerDied should parse");
        assert!(matches!(
            parsed,
            ParsedClientMessage::PlayerDied { final_score, .. } if final_score == 512.0
        ));
    }

    #[test]
    fn unknown_type_and_invalid_json_are_rejected() {
        assert!(parse_client_message(r#"{"type":"warp","playerId":"p1"}"#).is_none());
        assert!(parse_client_message("not json").is_none());
        assert!(parse_client_message(r#"[1,2,3]"#).is_none());
    }
}

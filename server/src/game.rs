//! Authoritative game rules
//!
//! The only code that mutates the server's registry. Every mutation goes
//! through the registry so it is recorded for replication; values are only
//! written when they actually change, so an idle world produces no versions.

use crate::client_manager::ServerConnection;
use log::{debug, info};
use shared::message::{InputMessage, PlayerAction, PlayerInfo, Team};
use shared::{
    Attribute, AttributeValue, ChangeTracker, DefaultEntityFactory, Family, Registry,
    RegistryError, Vector2,
};
use std::collections::HashMap;

pub const GRAVITY: f32 = 980.0;
pub const PLAYER_SPEED: f32 = 300.0;
pub const JUMP_VELOCITY: f32 = -400.0;
pub const FLOOR_Y: f32 = 550.0;
pub const WORLD_WIDTH: f32 = 800.0;
pub const WORLD_HEIGHT: f32 = 600.0;
pub const PLAYER_SIZE: f32 = 32.0;
pub const BULLET_SPEED: f32 = 600.0;
pub const BULLET_LIFETIME: f32 = 2.0;
pub const SHOT_COOLDOWN: f32 = 0.25;

pub struct GameState {
    pub registry: Registry,
    pub tracker: ChangeTracker,
    pub tick: u32,
    bullet_ages: HashMap<String, f32>,
    cooldowns: HashMap<String, f32>,
}

impl GameState {
    pub fn new(history_len: usize) -> Self {
        Self {
            registry: Registry::tracked(DefaultEntityFactory),
            tracker: ChangeTracker::new(history_len),
            tick: 0,
            bullet_ages: HashMap::new(),
            cooldowns: HashMap::new(),
        }
    }

    /// Spawns the static map entity
    pub fn load_map(&mut self, width: i32, height: i32) -> Result<String, RegistryError> {
        let name = self.registry.spawn(&Family::from(Family::MAP))?;
        self.registry
            .set(&name, Attribute::Width, AttributeValue::Integer(width))?;
        self.registry
            .set(&name, Attribute::Height, AttributeValue::Integer(height))?;
        Ok(name)
    }

    pub fn add_player(&mut self, username: &str) -> Result<String, RegistryError> {
        let name = self.registry.spawn(&Family::from(Family::PLAYER))?;
        let slot = self.player_count() as f32;
        let spawn = Vector2::new(
            100.0 + (slot * 60.0) % (WORLD_WIDTH - 200.0),
            FLOOR_Y - PLAYER_SIZE,
        );
        self.registry.set(
            &name,
            Attribute::PlayerName,
            AttributeValue::String(username.to_string()),
        )?;
        self.registry
            .set(&name, Attribute::Position, AttributeValue::Vector2(spawn))?;

        info!("Added player {} ({}) at ({}, {})", name, username, spawn.x, spawn.y);
        Ok(name)
    }

    pub fn remove_player(&mut self, name: &str) {
        if self.registry.remove(name).is_some() {
            self.cooldowns.remove(name);
            info!("Removed player {}", name);
        }
    }

    pub fn set_team(&mut self, player: &str, team: Team) -> Result<(), RegistryError> {
        self.set_if_changed(player, Attribute::Team, AttributeValue::Integer(team.code()))
    }

    pub fn player_count(&self) -> usize {
        self.registry
            .iter()
            .filter(|entity| entity.family().as_str() == Family::PLAYER)
            .count()
    }

    pub fn player_info<'a>(
        &self,
        connections: impl Iterator<Item = &'a ServerConnection>,
    ) -> Vec<PlayerInfo> {
        connections
            .map(|connection| PlayerInfo {
                entity_name: connection.player_entity.clone(),
                player_name: connection.username.clone(),
                team: connection.team,
            })
            .collect()
    }

    /// Advances the simulation by `dt` seconds using each player's latest input
    pub fn update<'a>(
        &mut self,
        inputs: impl Iterator<Item = (&'a str, &'a InputMessage)>,
        dt: f32,
    ) -> Result<(), RegistryError> {
        let inputs: Vec<(&str, &InputMessage)> = inputs.collect();
        for (player, input) in &inputs {
            if self.registry.contains(player) {
                self.apply_input(player, input, dt)?;
            }
        }
        self.update_bullets(dt)?;
        self.tick += 1;
        Ok(())
    }

    /// Commits the tick's mutations. Returns the new version if anything changed.
    pub fn commit(&mut self) -> Option<u32> {
        let version = self.tracker.commit(self.registry.drain_changes());
        if let Some(version) = version {
            debug!("Tick {} committed version {}", self.tick, version);
        }
        version
    }

    fn apply_input(
        &mut self,
        player: &str,
        input: &InputMessage,
        dt: f32,
    ) -> Result<(), RegistryError> {
        let Some(entity) = self.registry.get(player) else {
            return Ok(());
        };
        let position = entity
            .get(Attribute::Position)
            .and_then(AttributeValue::as_vector)
            .unwrap_or_default();
        let mut velocity = entity
            .get(Attribute::Velocity)
            .and_then(AttributeValue::as_vector)
            .unwrap_or_default();
        let on_ground = position.y + PLAYER_SIZE >= FLOOR_Y;

        velocity.x = 0.0;
        if input.actions.contains(&PlayerAction::WalkLeft) {
            velocity.x -= PLAYER_SPEED;
        }
        if input.actions.contains(&PlayerAction::WalkRight) {
            velocity.x += PLAYER_SPEED;
        }
        if input.actions.contains(&PlayerAction::Jump) && on_ground {
            velocity.y = JUMP_VELOCITY;
        } else if !on_ground {
            velocity.y += GRAVITY * dt;
        }

        let mut next = position.add(velocity.scale(dt));
        next.x = next.x.clamp(0.0, WORLD_WIDTH - PLAYER_SIZE);
        if next.y + PLAYER_SIZE >= FLOOR_Y {
            next.y = FLOOR_Y - PLAYER_SIZE;
            velocity.y = 0.0;
        }
        if next.y <= 0.0 {
            next.y = 0.0;
            velocity.y = 0.0;
        }

        if velocity.x != 0.0 {
            let orientation = if velocity.x < 0.0 { -1 } else { 1 };
            self.set_if_changed(
                player,
                Attribute::Orientation,
                AttributeValue::Integer(orientation),
            )?;
        }
        self.set_if_changed(player, Attribute::Velocity, AttributeValue::Vector2(velocity))?;
        self.set_if_changed(player, Attribute::Position, AttributeValue::Vector2(next))?;
        self.set_if_changed(player, Attribute::Cursor, AttributeValue::Vector2(input.cursor))?;

        let cooldown = self.cooldowns.entry(player.to_string()).or_insert(0.0);
        *cooldown = (*cooldown - dt).max(0.0);
        if input.actions.contains(&PlayerAction::ShootPrimary) && *cooldown <= 0.0 {
            *cooldown = SHOT_COOLDOWN;
            let origin = Vector2::new(next.x + PLAYER_SIZE / 2.0, next.y + PLAYER_SIZE / 2.0);
            self.spawn_bullet(origin, input.cursor)?;
        }
        Ok(())
    }

    fn spawn_bullet(&mut self, origin: Vector2, target: Vector2) -> Result<String, RegistryError> {
        let dx = target.x - origin.x;
        let dy = target.y - origin.y;
        let length = (dx * dx + dy * dy).sqrt();
        let direction = if length > f32::EPSILON {
            Vector2::new(dx / length, dy / length)
        } else {
            Vector2::new(1.0, 0.0)
        };

        let name = self.registry.spawn(&Family::from(Family::BULLET))?;
        self.registry
            .set(&name, Attribute::Position, AttributeValue::Vector2(origin))?;
        self.registry.set(
            &name,
            Attribute::Velocity,
            AttributeValue::Vector2(direction.scale(BULLET_SPEED)),
        )?;
        self.bullet_ages.insert(name.clone(), 0.0);
        debug!("Spawned {}", name);
        Ok(name)
    }

    fn update_bullets(&mut self, dt: f32) -> Result<(), RegistryError> {
        let bullets: Vec<String> = self.bullet_ages.keys().cloned().collect();
        for name in bullets {
            let Some(entity) = self.registry.get(&name) else {
                self.bullet_ages.remove(&name);
                continue;
            };
            let position = entity
                .get(Attribute::Position)
                .and_then(AttributeValue::as_vector)
                .unwrap_or_default();
            let velocity = entity
                .get(Attribute::Velocity)
                .and_then(AttributeValue::as_vector)
                .unwrap_or_default();
            let next = position.add(velocity.scale(dt));

            let age = self.bullet_ages.get(&name).copied().unwrap_or_default() + dt;
            let out_of_bounds =
                next.x < 0.0 || next.x > WORLD_WIDTH || next.y < 0.0 || next.y > WORLD_HEIGHT;
            if age >= BULLET_LIFETIME || out_of_bounds {
                self.registry.remove(&name);
                self.bullet_ages.remove(&name);
                continue;
            }
            self.bullet_ages.insert(name.clone(), age);
            self.registry
                .set(&name, Attribute::Position, AttributeValue::Vector2(next))?;
        }
        Ok(())
    }

    fn set_if_changed(
        &mut self,
        name: &str,
        attribute: Attribute,
        value: AttributeValue,
    ) -> Result<(), RegistryError> {
        let current = self
            .registry
            .get(name)
            .ok_or_else(|| RegistryError::NoSuchEntity(name.to_string()))?
            .get(attribute);
        if current == Some(&value) {
            return Ok(());
        }
        self.registry.set(name, attribute, value)
    }
}

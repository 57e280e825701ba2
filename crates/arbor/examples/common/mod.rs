//! The endless-runner node set shared by the `dino` and `headless` examples.
//!
//! ```text
//! game
//! └─ scenes (Switch)
//!    ├─ title                       (initial)
//!    └─ play
//!       ├─ cacti (Factory: cactus)
//!       ├─ dino
//!       ├─ ground
//!       ├─ referee                  watches dino contacts, mails game_over
//!       └─ score                    layer 10
//! ```

#![allow(dead_code)]

use arbor::prelude::*;

const INK: Color = Color {
    r: 0.33,
    g: 0.33,
    b: 0.33,
    a: 1.0,
};

const DINO_SIZE: Vec2 = Vec2::new(44.0, 47.0);
const CACTUS_SIZE: Vec2 = Vec2::new(24.0, 48.0);

/// Collision layers.
const PLAYER: u32 = 1 << 0;
const OBSTACLE: u32 = 1 << 1;

/// The scene switch the root attaches as `scenes`.
pub fn scenes() -> Switch {
    Switch::new()
        .register("title", || Title)
        .register("play", Play::default)
        .initial("title")
}

// ── Title ────────────────────────────────────────────────────────────────

pub struct Title;

impl Behavior for Title {
    fn event(&mut self, ctx: &mut NodeCtx, event: &InputEvent) -> Result<()> {
        match event {
            InputEvent::KeyDown(Key::Space | Key::Enter) => {
                ctx.mail_to("scenes", "switch_to", "play");
            }
            InputEvent::KeyDown(Key::Escape) => {
                let root = ctx.root_name();
                ctx.mail_to(&root, "quit", "");
            }
            _ => {}
        }
        Ok(())
    }

    fn render(&mut self, _ctx: &mut NodeCtx, canvas: &mut dyn Canvas) -> Result<()> {
        let size = canvas.size();
        let w = 200.0;
        canvas.fill_rect(Rect::new((size.x - w) / 2.0, size.y / 2.0 - 4.0, w, 8.0), INK);
        draw_number(canvas, 0, Vec2::new(size.x / 2.0 - 6.0, size.y / 2.0 + 20.0), 4.0);
        Ok(())
    }
}

// ── Play ─────────────────────────────────────────────────────────────────

/// Owns the round: spawns cacti on a timer and freezes everything on
/// `game_over`.
#[derive(Default)]
pub struct Play {
    spawn_timer: f32,
    spawned: usize,
    over: bool,
}

/// Seconds between cacti, cycled.
const SPAWN_GAPS: [f32; 4] = [1.3, 0.9, 1.7, 1.1];

impl Behavior for Play {
    fn init(&mut self, ctx: &mut NodeCtx) -> Result<()> {
        ctx.blackboard().set("score", 0.0);
        ctx.attach("cacti", Factory::new().register("cactus", Cactus::default))?;
        ctx.attach("dino", Dino::default())?;
        ctx.attach("ground", Ground)?;
        ctx.attach("referee", Referee::default())?;
        let score = ctx.attach("score", Score)?;
        ctx.tree().set_layer(score, 10)?;
        self.spawn_timer = SPAWN_GAPS[0];
        Ok(())
    }

    fn event(&mut self, ctx: &mut NodeCtx, event: &InputEvent) -> Result<()> {
        match event {
            InputEvent::KeyDown(Key::Space) if self.over => ctx.mail_to("scenes", "reset", ""),
            InputEvent::KeyDown(Key::Escape) => ctx.mail_to("scenes", "switch_to", "title"),
            _ => {}
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut NodeCtx, dt: f32) -> Result<()> {
        if self.over {
            return Ok(());
        }
        *ctx.blackboard().ensure("score", 0.0) += dt * 10.0;

        self.spawn_timer -= dt;
        if self.spawn_timer <= 0.0 {
            self.spawned += 1;
            self.spawn_timer += SPAWN_GAPS[self.spawned % SPAWN_GAPS.len()];
            ctx.mail_to("cacti", "spawn", "cactus");
        }
        Ok(())
    }

    fn mail(&mut self, ctx: &mut NodeCtx, mail: &Mail) -> Result<()> {
        if mail.subject != "game_over" || self.over {
            return Ok(());
        }
        self.over = true;
        let score = ctx.blackboard().get("score", 0.0);
        ctx.log(format_args!("game over, score {}", score as u32));
        let best = ctx.blackboard().get("best", 0.0).max(score);
        ctx.blackboard().set("best", best);
        for name in ["cacti", "dino"] {
            if let Some(id) = ctx.child(name) {
                ctx.tree().set_valve(id, Pulse::Time, false)?;
            }
        }
        Ok(())
    }
}

// ── Dino ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct Dino {
    y: f32,
    vy: f32,
    collider: Option<ColliderId>,
    sprite: Option<(TextureHandle, Animator)>,
}

impl Dino {
    const X: f32 = 80.0;

    fn grounded(&self, ground_y: f32) -> bool {
        self.y >= ground_y - DINO_SIZE.y
    }
}

impl Behavior for Dino {
    fn init(&mut self, ctx: &mut NodeCtx) -> Result<()> {
        let ground_y = ctx.blackboard().get("ground_y", 420.0);
        self.y = ground_y - DINO_SIZE.y;
        let name = ctx.name().to_owned();
        self.collider = Some(
            ctx.register_collider(
                ColliderDesc::new(name, Shape::rect(DINO_SIZE.x - 8.0, DINO_SIZE.y - 6.0))
                    .at(Vec2::new(Self::X + 4.0, self.y + 3.0))
                    .layer(PLAYER)
                    .mask(OBSTACLE),
            ),
        );

        match ctx.load_texture("dino.png") {
            Ok(texture) => {
                let sheet = SpriteSheet::new(4, 1, DINO_SIZE);
                let animator = Animator::new()
                    .with_clip("run", sheet.clip(2, 3, 0.1).looping())
                    .with_clip("jump", sheet.clip(0, 0, 0.1));
                self.sprite = Some((texture, animator));
            }
            Err(err) => log::debug!("{err}; drawing the dino as a block"),
        }
        Ok(())
    }

    fn event(&mut self, ctx: &mut NodeCtx, event: &InputEvent) -> Result<()> {
        if let InputEvent::KeyDown(Key::Space | Key::Up) = event {
            if self.grounded(ctx.blackboard().get("ground_y", 420.0)) {
                self.vy = -ctx.blackboard().get("jump_speed", 820.0);
            }
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut NodeCtx, dt: f32) -> Result<()> {
        let gravity = ctx.blackboard().get("gravity", 2400.0);
        let ground_y = ctx.blackboard().get("ground_y", 420.0);
        self.vy += gravity * dt;
        self.y += self.vy * dt;
        if self.grounded(ground_y) {
            self.y = ground_y - DINO_SIZE.y;
            self.vy = 0.0;
        }

        if let Some(id) = self.collider {
            let pos = Vec2::new(Self::X + 4.0, self.y + 3.0);
            ctx.collisions().update_position(id, pos);
        }
        if let Some((_, animator)) = &mut self.sprite {
            animator.play(if self.vy == 0.0 { "run" } else { "jump" }, false);
            animator.update(dt);
        }
        Ok(())
    }

    fn render(&mut self, _ctx: &mut NodeCtx, canvas: &mut dyn Canvas) -> Result<()> {
        let dst = Rect::from_min_size(Vec2::new(Self::X, self.y), DINO_SIZE);
        match &self.sprite {
            Some((texture, animator)) => canvas.draw_texture(*texture, animator.src(), dst, Color::WHITE),
            None => canvas.fill_rect(dst, INK),
        }
        Ok(())
    }
}

// ── Cactus ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct Cactus {
    x: f32,
    collider: Option<ColliderId>,
}

impl Behavior for Cactus {
    fn init(&mut self, ctx: &mut NodeCtx) -> Result<()> {
        self.x = ctx.blackboard().get("spawn_x", 980.0);
        let y = ctx.blackboard().get("ground_y", 420.0) - CACTUS_SIZE.y;
        let name = ctx.name().to_owned();
        self.collider = Some(
            ctx.register_collider(
                ColliderDesc::new(name, Shape::rect(CACTUS_SIZE.x, CACTUS_SIZE.y))
                    .at(Vec2::new(self.x, y))
                    .layer(OBSTACLE)
                    .mask(PLAYER),
            ),
        );
        Ok(())
    }

    fn update(&mut self, ctx: &mut NodeCtx, dt: f32) -> Result<()> {
        self.x -= ctx.blackboard().get("scroll_speed", 420.0) * dt;
        let y = ctx.blackboard().get("ground_y", 420.0) - CACTUS_SIZE.y;
        if let Some(id) = self.collider {
            ctx.collisions().update_position(id, Vec2::new(self.x, y));
        }
        if self.x < -CACTUS_SIZE.x {
            let name = ctx.name().to_owned();
            ctx.mail_to("cacti", "despawn", &name);
        }
        Ok(())
    }

    fn render(&mut self, ctx: &mut NodeCtx, canvas: &mut dyn Canvas) -> Result<()> {
        let y = ctx.blackboard().get("ground_y", 420.0) - CACTUS_SIZE.y;
        canvas.fill_rect(Rect::from_min_size(Vec2::new(self.x, y), CACTUS_SIZE), INK);
        Ok(())
    }

    fn is_leaf(&self) -> bool {
        true
    }
}

// ── Ground ───────────────────────────────────────────────────────────────

pub struct Ground;

impl Behavior for Ground {
    fn render(&mut self, ctx: &mut NodeCtx, canvas: &mut dyn Canvas) -> Result<()> {
        let y = ctx.blackboard().get("ground_y", 420.0);
        canvas.fill_rect(Rect::new(0.0, y, canvas.size().x, 2.0), INK);
        Ok(())
    }
}

// ── Referee ──────────────────────────────────────────────────────────────

/// Turns the dino's first contact with a cactus into `game_over` mail.
#[derive(Default)]
pub struct Referee {
    contacts: ContactTracker,
    target: Option<ColliderId>,
}

impl Behavior for Referee {
    fn update(&mut self, ctx: &mut NodeCtx, _dt: f32) -> Result<()> {
        if self.target.is_none() {
            self.target = ctx
                .collisions()
                .iter()
                .find(|(_, c)| c.owner_name == "dino")
                .map(|(id, _)| id);
        }
        let Some(target) = self.target else {
            log::debug!("[{}] dino collider not registered yet", ctx.name());
            return Ok(());
        };

        let world = ctx.collisions();
        let entered: Vec<String> = self
            .contacts
            .track(world, target)
            .into_iter()
            .filter_map(|contact| match contact {
                Contact::Enter(other) => Some(world.owner_name(other).unwrap_or("?").to_owned()),
                Contact::Exit(_) => None,
            })
            .collect();
        for owner in entered {
            ctx.log(format_args!("dino hit {owner}"));
            ctx.mail_to("play", "game_over", &owner);
        }
        Ok(())
    }
}

// ── Score ────────────────────────────────────────────────────────────────

pub struct Score;

impl Behavior for Score {
    fn render(&mut self, ctx: &mut NodeCtx, canvas: &mut dyn Canvas) -> Result<()> {
        let score = ctx.blackboard().get("score", 0.0) as u32;
        let best = ctx.blackboard().get("best", 0.0) as u32;
        let right = canvas.size().x - 20.0;
        draw_number(canvas, score, Vec2::new(right - 5.0 * 16.0, 20.0), 3.0);
        if best > 0 {
            draw_number(canvas, best, Vec2::new(right - 12.0 * 16.0, 20.0), 3.0);
        }
        Ok(())
    }
}

/// 3x5 block digits, five wide, zero padded.
fn draw_number(canvas: &mut dyn Canvas, value: u32, at: Vec2, px: f32) {
    const GLYPHS: [u16; 10] = [
        0b111_101_101_101_111,
        0b010_110_010_010_111,
        0b111_001_111_100_111,
        0b111_001_111_001_111,
        0b101_101_111_001_001,
        0b111_100_111_001_111,
        0b111_100_111_101_111,
        0b111_001_001_001_001,
        0b111_101_111_101_111,
        0b111_101_111_001_111,
    ];
    let digits = format!("{:05}", value % 100_000);
    for (i, d) in digits.bytes().enumerate() {
        let glyph = GLYPHS[(d - b'0') as usize];
        let origin = at + Vec2::new(i as f32 * 4.0 * px, 0.0);
        for bit in 0..15 {
            if glyph & (1 << (14 - bit)) != 0 {
                let cell = Vec2::new((bit % 3) as f32, (bit / 3) as f32) * px;
                canvas.fill_rect(Rect::from_min_size(origin + cell, Vec2::splat(px)), INK);
            }
        }
    }
}

//! Shared UI icons.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Pipeline indicators
pub static BOOK: Emoji<'_, '_> = Emoji("📖 ", "");
pub static PEN: Emoji<'_, '_> = Emoji("✍️  ", "[W]");
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");

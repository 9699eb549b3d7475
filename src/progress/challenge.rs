use serde::Serialize;

/// One day of the speaking challenge
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChallengeDay {
    pub day: u8,
    pub title: &'static str,
    pub description: &'static str,
    /// Suggested take length
    pub target_secs: u64,
    pub prompt: &'static str,
}

pub const CHALLENGE_DAYS: [ChallengeDay; 7] = [
    ChallengeDay {
        day: 1,
        title: "Introduction & Goals",
        description: "Introduce yourself and share your speaking goals",
        target_secs: 120,
        prompt: "Please introduce yourself. Share your name, where you're from, and what you hope to achieve with your English speaking practice.",
    },
    ChallengeDay {
        day: 2,
        title: "Daily Routine",
        description: "Describe your typical day in detail",
        target_secs: 180,
        prompt: "Describe your typical day from morning to evening. What activities do you do? What do you enjoy most about your daily routine?",
    },
    ChallengeDay {
        day: 3,
        title: "Favorite Memory",
        description: "Share a cherished memory and why it matters",
        target_secs: 180,
        prompt: "Tell us about one of your favorite memories. What happened? Who was there? Why is this memory special to you?",
    },
    ChallengeDay {
        day: 4,
        title: "Problem Solving",
        description: "Discuss a challenge you overcame",
        target_secs: 240,
        prompt: "Think of a challenge or problem you faced and overcame. How did you solve it? What did you learn from the experience?",
    },
    ChallengeDay {
        day: 5,
        title: "Future Plans",
        description: "Talk about your dreams and aspirations",
        target_secs: 240,
        prompt: "What are your goals and dreams for the future? Where do you see yourself in 5 years? What steps will you take to achieve these goals?",
    },
    ChallengeDay {
        day: 6,
        title: "Opinion Piece",
        description: "Express your views on a current topic",
        target_secs: 300,
        prompt: "Choose a topic you care about (technology, environment, education, etc.) and share your opinion. Support your views with reasons and examples.",
    },
    ChallengeDay {
        day: 7,
        title: "Reflection & Growth",
        description: "Reflect on your week of practice",
        target_secs: 300,
        prompt: "Reflect on your speaking practice this week. What have you learned? How have you improved? What will you continue practicing?",
    },
];

/// Catalog entry for `day` (1-based)
pub fn challenge_day(day: u8) -> Option<&'static ChallengeDay> {
    CHALLENGE_DAYS.iter().find(|d| d.day == day)
}

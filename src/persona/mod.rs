// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Assistant persona and conversation assembly
//!
//! The assistant always speaks as the portfolio site's guide: the profile
//! below is sent as the opening turn of every upstream conversation, followed
//! by a scripted acknowledgment so the model starts from a committed persona
//! rather than a bare instruction.

use crate::sanitize::{Turn, TurnRole};
use crate::upstream::Content;

/// Persona preamble sent as the first turn of every conversation.
pub const PERSONA_PROMPT: &str = r#"You are an AI assistant embedded on Lakshya Purohit's personal portfolio website. You must answer all questions about Lakshya warmly, concisely (2-4 sentences), and professionally. Here is Lakshya's full profile:

**Personal Info:**
- Name: Lakshya Purohit
- Role: Software Developer & System Architect
- Location: Jaipur, Rajasthan, India
- Email: lakshya.purohit.2105@gmail.com
- Education: B.Tech in Computer Science

**Core Skills:**
ASP.NET Core, C#, Angular, TypeScript, Node.js, Python, Flask, WebRTC, Mediasoup, PostgreSQL, SQL Server, Docker, Microservices, REST APIs, SignalR, OpenCV, Tesseract OCR, React, Next.js, JavaScript, HTML/CSS, Git

**Work Experience:**
1. Software Developer (2024-Present): Building enterprise solutions with ASP.NET Core, Angular, and microservices architecture. Led Video e-KYC platform development.
2. Junior Developer (2023-2024): Developed OCR Invoice Engine, backend APIs, and automation tools with Python and Flask.

**Key Projects:**
1. Schema Drift Tool - Detects schema drift between database environments. Visual diffing engine, automated safe migration workflows. Live at: db-version-control.onrender.com
2. Video e-KYC Platform - Secure peer-to-peer video verification using WebRTC + Mediasoup (SFU). Angular frontend + Node.js backend. Face detection and encrypted media channels for banking compliance.
3. OCR Invoice Engine - Automated OCR system using OpenCV preprocessing (deskewing, noise removal) + Tesseract. Improved accuracy by 40%. Generates structured Excel reports.
4. Warehouse Management System - Mission-critical WMS with Printing API and Invoicing using ASP.NET Core microservices. Reduced manual errors by 30%.

**How Lakshya Uses AI:**
- Computer Vision & OCR: Built intelligent document processing with OpenCV + Tesseract, AI-driven preprocessing boosted accuracy by 40%.
- Real-time Video Intelligence: Integrated face detection into Video e-KYC for automated identity verification.
- AI-Assisted Development: Uses LLMs for code review, documentation generation, and architecture planning.
- Smart Automation: ML-based anomaly detection in database schemas and infrastructure scaling.

**This Portfolio Website:**
Built with Next.js 15, GSAP, Framer Motion, custom canvas cursor, dark/light theme toggle, Lenis smooth scrolling.

Keep answers SHORT (2-4 sentences). Be friendly. If asked something outside Lakshya's context, politely redirect."#;

/// Scripted acknowledgment returned by the model-side turn that follows the
/// persona preamble.
pub const PERSONA_ACK: &str = "Got it! I'm Lakshya's AI assistant. I'll answer questions about his work, projects, skills, and experience concisely and professionally. How can I help?";

/// Assemble the ordered turn list for one upstream call.
///
/// Layout: persona preamble, scripted acknowledgment, the validated history
/// (assistant turns become `"model"` turns), then the current message. Built
/// fresh per request and never retained.
pub fn build_conversation(history: &[Turn], message: &str) -> Vec<Content> {
    let mut contents = Vec::with_capacity(history.len() + 3);
    contents.push(Content::user(PERSONA_PROMPT));
    contents.push(Content::model(PERSONA_ACK));

    for turn in history {
        contents.push(match turn.role {
            TurnRole::User => Content::user(turn.text.as_str()),
            TurnRole::Assistant => Content::model(turn.text.as_str()),
        });
    }

    contents.push(Content::user(message));
    contents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: TurnRole, text: &str) -> Turn {
        Turn {
            role,
            text: text.to_string(),
        }
    }

    #[test]
    fn conversation_opens_with_persona_and_ack() {
        let contents = build_conversation(&[], "Who is Lakshya?");

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role(), "user");
        assert_eq!(contents[0].text(), Some(PERSONA_PROMPT));
        assert_eq!(contents[1].role(), "model");
        assert_eq!(contents[1].text(), Some(PERSONA_ACK));
        assert_eq!(contents[2].role(), "user");
        assert_eq!(contents[2].text(), Some("Who is Lakshya?"));
    }

    #[test]
    fn assistant_turns_map_to_model_role() {
        let history = vec![
            turn(TurnRole::User, "What does he do?"),
            turn(TurnRole::Assistant, "He builds software."),
        ];
        let contents = build_conversation(&history, "Tell me more");

        assert_eq!(contents.len(), 5);
        assert_eq!(contents[2].role(), "user");
        assert_eq!(contents[3].role(), "model");
        assert_eq!(contents[3].text(), Some("He builds software."));
        assert_eq!(contents[4].text(), Some("Tell me more"));
    }
}

//! Canonical example document per format, shown by `trailport sample`.

use crate::detect::Format;

const TXT: &str = r#"=== TRAIL ===
title: Vibe Coding
subtitle: Building software together with an AI assistant
description: A hands-on introduction to prompt-driven development.
icon: 🤖
color: #6C5CE7

=== MODULE ===
title: Introduction
type: theory
points: 50
---
Vibe coding means describing what you want and letting the assistant write
the first draft. You stay responsible for reviewing every line.

=== MODULE ===
title: Your First Prompt
type: practice
---
A good prompt names the goal, the constraints and the expected output.

=== QUESTIONS ===
Q: What should a good prompt contain?
- The goal and the constraints*
- Only the programming language
- Nothing, the assistant will guess
Explanation: The assistant cannot know constraints you never state.

Q: Match each metric with who owns it
- CTR -> Marketing
- CPC -> Marketing
- ROI -> Management
"#;

const MD: &str = r#"---
title: Git Basics
icon: 🌿
color: #F05032
---

# Git Basics

Version control for everyday work.

## Commits
<!-- type: theory, points: 50 -->

A commit is a snapshot of the working tree with a message.

## Branches

Branches are movable pointers to commits.

### Quiz

Which command creates a branch?
- [ ] git commit
- [x] git branch
- [ ] git status

## Final Project
<!-- type: project, points: 100 -->

Publish a repository with three meaningful commits.
"#;

const JSON: &str = r##"{
  "trails": [
    {
      "title": "Web Analytics",
      "slug": "web-analytics",
      "subtitle": "Numbers that matter",
      "description": "Read a dashboard and act on it.",
      "icon": "📊",
      "color": "#00B894",
      "modules": [
        {
          "title": "Key Metrics",
          "type": "THEORY",
          "points": 50,
          "content": "CTR, CPC and ROI describe different parts of the funnel."
        },
        {
          "title": "Metrics Quiz",
          "type": "PRACTICE",
          "points": 75,
          "content": "Check what you remember.",
          "questions": [
            {
              "type": "SINGLE_CHOICE",
              "question": "What does CTR measure?",
              "options": ["Clicks per impression", "Cost per click", "Return on investment"],
              "correctAnswer": 0,
              "explanation": "Click-through rate is clicks divided by impressions."
            },
            {
              "type": "MATCHING",
              "question": "Match each metric with its owner",
              "data": {
                "leftItems": [{"id": "l1", "text": "CTR"}, {"id": "l2", "text": "CPC"}, {"id": "l3", "text": "ROI"}],
                "rightItems": [{"id": "r1", "text": "Marketing"}, {"id": "r2", "text": "Management"}],
                "correctPairs": {"l1": "r1", "l2": "r1", "l3": "r2"}
              }
            },
            {
              "type": "ORDERING",
              "question": "Order the funnel stages",
              "data": {
                "items": [{"id": "1", "text": "Impression"}, {"id": "2", "text": "Click"}, {"id": "3", "text": "Purchase"}],
                "correctOrder": ["1", "2", "3"]
              }
            },
            {
              "type": "CASE_ANALYSIS",
              "question": "What went wrong in this campaign?",
              "data": {
                "caseContent": "CTR doubled while sales stayed flat.",
                "options": [
                  {"id": "a", "text": "The landing page does not convert", "isCorrect": true},
                  {"id": "b", "text": "The ads are never shown", "isCorrect": false}
                ],
                "minCorrectRequired": 1
              }
            }
          ]
        }
      ]
    }
  ]
}
"##;

const XML: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<trail title="Linux Shell" icon="🐧" color="#2D3436">
  <description>Move around a Unix system with confidence.</description>
  <module type="theory">
    <title>Navigation</title>
    <content>Use cd, ls and pwd to move around the file tree.</content>
  </module>
  <module type="practice" points="75">
    <title>Permissions</title>
    <content>Every file has an owner, a group and mode bits.</content>
    <question>
      <text>Which command changes file permissions?</text>
      <option>chown</option>
      <option correct="true">chmod</option>
      <option>ls</option>
    </question>
  </module>
</trail>
"##;

const HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Course export</title></head>
<body>
  <h1>Web Basics</h1>
  <p>How pages are built.</p>

  <h2>HTML</h2>
  <p>HTML describes the <strong>structure</strong> of a page.</p>

  <h2>Quiz</h2>
  <p>Which tag creates a link?</p>
  <ul>
    <li>&lt;a&gt; (correct)</li>
    <li>&lt;p&gt;</li>
    <li>&lt;div&gt;</li>
  </ul>
</body>
</html>
"#;

const YML: &str = r#"---
title: Docker Essentials
description: Containers from first principles
modules:
  - title: Images
    type: theory
    content: An image is a read-only template for containers.
  - title: Containers
    type: practice
    content: A container is a running instance of an image.
"#;

const CSV: &str = r#"module,type,content
Variables,theory,Names that refer to values
Functions,theory,Reusable blocks of code
Exercises,practice,Write a function that adds two numbers
"#;

const RTF: &str = r#"{\rtf1\ansi\deff0{\fonttbl{\f0 Arial;}}
\f0 === TRAIL ===\par
title: Networking Basics\par
=== MODULE ===\par
title: IP Addresses\par
type: theory\par
---\par
Every host on a network has an address.\par
=== MODULE ===\par
title: Ports\par
---\par
Ports identify services on a host.\par
=== QUESTIONS ===\par
Q: Which port does HTTPS use by default?\par
- 443*\par
- 80\par
}
"#;

const RST: &str = r#"Python Course
=============

Learn Python step by step.

Variables
---------

Names bind to objects.

Loops
-----

``for`` and ``while`` repeat work.

.. code-block:: python

   for i in range(3):
       print(i)
"#;

const TEX: &str = r#"\documentclass{article}
\title{Algorithms}
\begin{document}
\maketitle

\section{Sorting}
We sort \textbf{arrays} to search them faster.
\begin{itemize}
\item Quick sort
\item Merge sort
\end{itemize}

\section{Searching}
Binary search halves the range on every step.
\end{document}
"#;

const ORG: &str = r#"#+TITLE: Emacs Course
#+AUTHOR: Course Team

* Buffers
Every open file lives in a buffer.

* Windows
A window shows one buffer.
** Splitting
C-x 2 splits the frame horizontally.
"#;

const ADOC: &str = r#"= Rust Basics
:author: Course Team

Safe systems programming.

== Ownership

Each value has exactly one owner.

== Borrowing

References let code use a value without owning it.

----
let s = String::from("hi");
let r = &s;
----
"#;

/// Sample document for `format`; `None` for binary containers, which
/// cannot be shown as text.
pub fn sample(format: Format) -> Option<&'static str> {
    let sample = match format {
        Format::Txt => TXT,
        Format::Md => MD,
        Format::Json => JSON,
        Format::Xml => XML,
        Format::Html => HTML,
        Format::Yml => YML,
        Format::Csv => CSV,
        Format::Rtf => RTF,
        Format::Rst => RST,
        Format::Tex => TEX,
        Format::Org => ORG,
        Format::Adoc => ADOC,
        Format::Docx | Format::Doc | Format::Odt | Format::Pdf | Format::Unknown => return None,
    };
    Some(sample)
}

/// How to prepare a binary document, for formats without a text sample.
pub fn binary_hint(format: Format) -> &'static str {
    match format {
        Format::Docx | Format::Odt | Format::Doc => {
            "Use Heading 1 for the course title and Heading 2 for each lesson. \
             Put quiz questions under a heading named Quiz, one option per line, \
             and mark the right option with * or (correct)."
        }
        Format::Pdf => {
            "PDF text is extracted and parsed like plain text: keep one heading per line \
             and follow the plain-text layout (trailport sample txt)."
        }
        _ => "No sample is available for this format.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::detect_format;
    use crate::model::QuestionType;
    use crate::parser::{ParseOptions, parse_document};

    #[test]
    fn test_every_text_sample_parses() {
        for format in Format::ALL {
            let Some(sample) = sample(format) else {
                continue;
            };
            let filename = format!("sample.{}", format.as_str());
            assert_eq!(detect_format(&filename, sample.as_bytes()), format);
            let result = parse_document(format, sample.as_bytes(), &ParseOptions::default());
            assert!(result.success, "{} sample failed: {:?}", format, result.errors);
            assert!(result.module_count() >= 1, "{} sample has no modules", format);
        }
    }

    #[test]
    fn test_binary_formats_have_hints() {
        for format in [Format::Docx, Format::Doc, Format::Odt, Format::Pdf] {
            assert!(sample(format).is_none());
            assert!(!binary_hint(format).is_empty());
        }
    }

    #[test]
    fn test_json_sample_shows_every_question_type() {
        let result = parse_document(Format::Json, JSON.as_bytes(), &ParseOptions::default());
        let types: Vec<QuestionType> = result.trails[0].modules[1]
            .questions
            .iter()
            .map(|q| q.question_type)
            .collect();
        assert_eq!(
            types,
            vec![
                QuestionType::SingleChoice,
                QuestionType::Matching,
                QuestionType::Ordering,
                QuestionType::CaseAnalysis
            ]
        );
    }

    #[test]
    fn test_txt_sample_is_structured() {
        let result = parse_document(Format::Txt, TXT.as_bytes(), &ParseOptions::default());
        let trail = &result.trails[0];
        assert_eq!(trail.title, "Vibe Coding");
        assert_eq!(trail.modules.len(), 2);
        assert!(!trail.modules[1].questions.is_empty());
    }
}

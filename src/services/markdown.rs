use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

/// Block-level content of one rendered message. Inline formatting is
/// flattened to plain text for the terminal; inline code keeps its
/// backticks and links fold back to `[text](url)`.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBlock {
    Paragraph(String),
    CodeBlock {
        language: Option<String>,
        code: String,
    },
    Heading {
        level: u8,
        text: String,
    },
    ListItem {
        depth: usize,
        marker: String,
        text: String,
    },
    Quote(String),
    Rule,
}

pub fn parse_markdown(input: &str) -> Vec<MessageBlock> {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
    let parser = Parser::new_ext(input, options);

    let mut ctx = ParseContext::new();
    for event in parser {
        ctx.handle_event(&event);
    }
    ctx.finish()
}

struct ListState {
    ordered: bool,
    next_index: u64,
}

struct ParseContext {
    blocks: Vec<MessageBlock>,
    // Accumulated inline text for the current paragraph/heading/item
    text_buf: String,
    in_code_block: bool,
    code_block_lang: Option<String>,
    code_block_content: String,
    heading_level: Option<u8>,
    quote_depth: u32,
    list_stack: Vec<ListState>,
    link_dest: Option<String>,
}

impl ParseContext {
    fn new() -> Self {
        Self {
            blocks: Vec::new(),
            text_buf: String::new(),
            in_code_block: false,
            code_block_lang: None,
            code_block_content: String::new(),
            heading_level: None,
            quote_depth: 0,
            list_stack: Vec::new(),
            link_dest: None,
        }
    }

    fn handle_event(&mut self, event: &Event) {
        match event {
            Event::Start(tag) => self.handle_start(tag),
            Event::End(tag) => self.handle_end(tag),
            Event::Text(text) => {
                if self.in_code_block {
                    self.code_block_content.push_str(text);
                } else {
                    self.text_buf.push_str(text);
                }
            }
            Event::Code(code) => {
                self.text_buf.push('`');
                self.text_buf.push_str(code);
                self.text_buf.push('`');
            }
            Event::SoftBreak => self.text_buf.push(' '),
            Event::HardBreak => self.text_buf.push('\n'),
            Event::Rule => {
                self.flush_paragraph();
                self.blocks.push(MessageBlock::Rule);
            }
            _ => {}
        }
    }

    fn handle_start(&mut self, tag: &Tag) {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading { level, .. } => {
                self.flush_paragraph();
                self.heading_level = Some(heading_level_to_u8(level));
            }
            Tag::Link { dest_url, .. } => {
                self.text_buf.push('[');
                self.link_dest = Some(dest_url.to_string());
            }
            Tag::CodeBlock(kind) => {
                self.flush_paragraph();
                self.in_code_block = true;
                self.code_block_content.clear();
                self.code_block_lang = match kind {
                    pulldown_cmark::CodeBlockKind::Fenced(lang) => {
                        let lang = lang.trim().to_string();
                        if lang.is_empty() {
                            None
                        } else {
                            Some(lang)
                        }
                    }
                    pulldown_cmark::CodeBlockKind::Indented => None,
                };
            }
            Tag::BlockQuote(_) => {
                self.flush_paragraph();
                self.quote_depth += 1;
            }
            Tag::List(start) => {
                self.flush_paragraph();
                self.list_stack.push(ListState {
                    ordered: start.is_some(),
                    next_index: start.unwrap_or(1),
                });
            }
            Tag::Item => {}
            _ => {}
        }
    }

    fn handle_end(&mut self, tag: &TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                if self.heading_level.is_some() {
                    return;
                }
                if !self.list_stack.is_empty() {
                    // Loose list items run their paragraphs together.
                    if !self.text_buf.is_empty() && !self.text_buf.ends_with(' ') {
                        self.text_buf.push(' ');
                    }
                    return;
                }
                self.flush_paragraph();
            }
            TagEnd::Heading(_level) => {
                let text = std::mem::take(&mut self.text_buf);
                if let Some(level) = self.heading_level.take() {
                    self.blocks.push(MessageBlock::Heading { level, text });
                }
            }
            TagEnd::Link => {
                self.text_buf.push_str("](");
                if let Some(url) = self.link_dest.take() {
                    self.text_buf.push_str(&url);
                }
                self.text_buf.push(')');
            }
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                let code = std::mem::take(&mut self.code_block_content);
                let language = self.code_block_lang.take();
                // Trim trailing newline
                let code = code.trim_end_matches('\n').to_string();
                self.blocks.push(MessageBlock::CodeBlock { language, code });
            }
            TagEnd::BlockQuote(_) => {
                self.flush_paragraph();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::List(_) => {
                self.list_stack.pop();
            }
            TagEnd::Item => {
                let text = std::mem::take(&mut self.text_buf);
                let text = text.trim_end().to_string();
                let depth = self.list_stack.len().saturating_sub(1);
                let marker = match self.list_stack.last_mut() {
                    Some(list) if list.ordered => {
                        let marker = format!("{}.", list.next_index);
                        list.next_index += 1;
                        marker
                    }
                    _ => "-".to_string(),
                };
                if !text.is_empty() {
                    self.blocks.push(MessageBlock::ListItem {
                        depth,
                        marker,
                        text,
                    });
                }
            }
            _ => {}
        }
    }

    fn flush_paragraph(&mut self) {
        // Item text is flushed only when its item ends.
        if self.text_buf.is_empty() || !self.list_stack.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text_buf);
        if self.quote_depth > 0 {
            self.blocks.push(MessageBlock::Quote(text));
        } else {
            self.blocks.push(MessageBlock::Paragraph(text));
        }
    }

    fn finish(mut self) -> Vec<MessageBlock> {
        self.flush_paragraph();
        self.blocks
    }
}

fn heading_level_to_u8(level: &HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

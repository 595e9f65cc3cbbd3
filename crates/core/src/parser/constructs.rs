use super::Parser;
use crate::ast::{
    GroupDecl, MetadataEntry, PermissionBlockNode, ResourceDecl, ResourceProperty, ResourceRef,
    ResourceType, RoleDecl, RolePermissions, RuleDecl, RuleType, UserDecl, ValidPeriod,
};
use crate::error::SyntaxError;
use crate::lexer::{unescape, TokenKind};

/// Identifiers and keywords both read as words inside dotted paths.
pub(super) fn is_word_token(kind: TokenKind) -> bool {
    kind == TokenKind::Ident || kind.is_keyword()
}

impl<'a> Parser<'a> {
    // -- Declarations --------------------------------------------

    pub(super) fn parse_role(&mut self, line: u32) -> Result<RoleDecl, SyntaxError> {
        self.advance(); // ROLE
        let name = self.take_ident("a role name")?;
        let parent = if self.eat(TokenKind::Extends) {
            Some(self.take_ident("a parent role name after 'extends'")?)
        } else {
            None
        };
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut body = Vec::new();
        while !matches!(self.peek(), TokenKind::RBrace | TokenKind::Eof) {
            body.push(self.parse_role_permissions()?);
            self.eat(TokenKind::Comma);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(RoleDecl {
            name,
            parent,
            body,
            line,
        })
    }

    fn parse_role_permissions(&mut self) -> Result<RolePermissions, SyntaxError> {
        let line = self.cur_line();
        match self.peek() {
            TokenKind::Permissions => {
                self.advance();
                self.expect_colon()?;
                self.expect(TokenKind::LBracket, "'['")?;
                let mut blocks = vec![self.parse_permission_block()?];
                while self.eat(TokenKind::Comma) {
                    blocks.push(self.parse_permission_block()?);
                }
                self.expect(TokenKind::RBracket, "',' or ']'")?;
                Ok(RolePermissions::Blocks { blocks, line })
            }
            TokenKind::Can => {
                self.advance();
                self.expect_colon()?;
                self.expect(TokenKind::LBracket, "'['")?;
                let actions = self.parse_action_list()?;
                self.expect(TokenKind::RBracket, "',' or ']'")?;
                self.expect(TokenKind::Resources, "'resources' after the 'can' list")?;
                self.expect_colon()?;
                self.expect(TokenKind::LBracket, "'['")?;
                let resources = self.parse_resource_list()?;
                self.expect(TokenKind::RBracket, "',' or ']'")?;
                Ok(RolePermissions::Legacy {
                    actions,
                    resources,
                    line,
                })
            }
            _ => Err(self.err(format!(
                "expected 'permissions' or 'can' in role body, found {}",
                self.cur().describe()
            ))),
        }
    }

    fn parse_permission_block(&mut self) -> Result<PermissionBlockNode, SyntaxError> {
        let line = self.cur_line();
        self.expect(TokenKind::LBrace, "'{' to open a permission block")?;
        self.expect(TokenKind::Actions, "'actions'")?;
        self.expect_colon()?;
        self.expect(TokenKind::LBracket, "'['")?;
        let actions = self.parse_action_list()?;
        self.expect(TokenKind::RBracket, "',' or ']'")?;
        self.expect(TokenKind::Comma, "','")?;
        self.expect(TokenKind::Resources, "'resources'")?;
        self.expect_colon()?;
        self.expect(TokenKind::LBracket, "'['")?;
        let resources = self.parse_resource_list()?;
        self.expect(TokenKind::RBracket, "',' or ']'")?;
        let condition = if self.eat(TokenKind::Comma) {
            self.expect(TokenKind::Conditions, "'conditions'")?;
            self.expect_colon()?;
            Some(self.parse_condition()?)
        } else {
            None
        };
        self.expect(TokenKind::RBrace, "'}' to close the permission block")?;
        Ok(PermissionBlockNode {
            actions,
            resources,
            condition,
            line,
        })
    }

    pub(super) fn parse_user(&mut self, line: u32) -> Result<UserDecl, SyntaxError> {
        self.advance(); // USER
        let name = self.take_ident("a user name")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        // A body may open with a stray comma: `USER u {, valid_from: ...}`.
        self.eat(TokenKind::Comma);
        let mut roles = Vec::new();
        let mut valid = None;
        if self.eat(TokenKind::Role) {
            self.expect_colon()?;
            roles = self.parse_ident_list("a role name")?;
            if self.eat(TokenKind::Comma) {
                valid = Some(self.parse_valid_period()?);
            }
        } else if self.peek() == TokenKind::ValidFrom {
            valid = Some(self.parse_valid_period()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(UserDecl {
            name,
            roles,
            valid,
            line,
        })
    }

    fn parse_valid_period(&mut self) -> Result<ValidPeriod, SyntaxError> {
        let line = self.cur_line();
        self.expect(TokenKind::ValidFrom, "'valid_from'")?;
        self.expect_colon()?;
        let from = self.expect(TokenKind::StringLit, "a date string")?;
        self.expect(TokenKind::Comma, "','")?;
        self.expect(TokenKind::ValidUntil, "'valid_until'")?;
        self.expect_colon()?;
        let until = self.expect(TokenKind::StringLit, "a date string")?;
        Ok(ValidPeriod {
            from: unescape(&from.text),
            until: unescape(&until.text),
            line,
        })
    }

    pub(super) fn parse_resource(&mut self, line: u32) -> Result<ResourceDecl, SyntaxError> {
        self.advance(); // RESOURCE
        let name = self.take_ident("a resource name")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut properties = vec![self.parse_resource_property()?];
        while self.eat(TokenKind::Comma) {
            properties.push(self.parse_resource_property()?);
        }
        self.expect(TokenKind::RBrace, "',' or '}'")?;
        Ok(ResourceDecl {
            name,
            properties,
            line,
        })
    }

    fn parse_resource_property(&mut self) -> Result<ResourceProperty, SyntaxError> {
        let line = self.cur_line();
        match self.peek() {
            TokenKind::Path => {
                self.advance();
                self.expect_colon()?;
                let value = self.expect(TokenKind::StringLit, "a path string")?;
                Ok(ResourceProperty::Path {
                    value: unescape(&value.text),
                    line,
                })
            }
            TokenKind::Type => {
                self.advance();
                self.expect_colon()?;
                let value = match self.peek() {
                    TokenKind::Api => ResourceType::Api,
                    TokenKind::Folder => ResourceType::Folder,
                    TokenKind::Database => ResourceType::Database,
                    _ => {
                        return Err(self.err(format!(
                            "expected API, FOLDER or DATABASE, found {}",
                            self.cur().describe()
                        )))
                    }
                };
                self.advance();
                Ok(ResourceProperty::Type { value, line })
            }
            TokenKind::Metadata => {
                self.advance();
                self.expect_colon()?;
                self.expect(TokenKind::LBrace, "'{'")?;
                let mut entries = Vec::new();
                if self.peek() != TokenKind::RBrace {
                    entries.push(self.parse_metadata_entry()?);
                    while self.eat(TokenKind::Comma) {
                        entries.push(self.parse_metadata_entry()?);
                    }
                }
                self.expect(TokenKind::RBrace, "',' or '}'")?;
                Ok(ResourceProperty::Metadata { entries, line })
            }
            _ => Err(self.err(format!(
                "expected 'path', 'type' or 'metadata', found {}",
                self.cur().describe()
            ))),
        }
    }

    fn parse_metadata_entry(&mut self) -> Result<MetadataEntry, SyntaxError> {
        let line = self.cur_line();
        let key = self.take_ident("a metadata key")?;
        self.expect_colon()?;
        let value = self.parse_value()?;
        Ok(MetadataEntry { key, value, line })
    }

    pub(super) fn parse_group(&mut self, line: u32) -> Result<GroupDecl, SyntaxError> {
        self.advance(); // GROUP
        let name = self.take_ident("a group name")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        self.eat(TokenKind::Comma);
        let mut members = Vec::new();
        let mut roles = Vec::new();
        if self.eat(TokenKind::Members) {
            self.expect_colon()?;
            members = self.parse_ident_list("a member name")?;
            if self.eat(TokenKind::Comma) && self.eat(TokenKind::Role) {
                self.expect_colon()?;
                roles = self.parse_ident_list("a role name")?;
            }
        } else if self.eat(TokenKind::Role) {
            self.expect_colon()?;
            roles = self.parse_ident_list("a role name")?;
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(GroupDecl {
            name,
            members,
            roles,
            line,
        })
    }

    /// `ALLOW action: read ON resource: db.orders IF <condition>`
    pub(super) fn parse_rule(&mut self, line: u32) -> Result<RuleDecl, SyntaxError> {
        let rule_type = if self.is_word("allow") {
            RuleType::Allow
        } else {
            RuleType::Deny
        };
        self.advance();
        self.expect_word("action")?;
        self.expect_colon()?;
        let actions = if self.eat(TokenKind::LBracket) {
            let list = self.parse_action_list()?;
            self.expect(TokenKind::RBracket, "',' or ']'")?;
            list
        } else {
            vec![self.parse_action()?]
        };
        self.expect_word("on")?;
        self.expect(TokenKind::Resource, "'resource'")?;
        self.expect_colon()?;
        let resources = if self.eat(TokenKind::LBracket) {
            let list = self.parse_resource_list()?;
            self.expect(TokenKind::RBracket, "',' or ']'")?;
            list
        } else {
            vec![self.parse_resource_ref()?]
        };
        let condition = if self.is_word("if") {
            self.advance();
            Some(self.parse_condition()?)
        } else {
            None
        };
        Ok(RuleDecl {
            rule_type,
            actions,
            resources,
            condition,
            line,
        })
    }

    // -- Lists and references --------------------------------------

    fn parse_action(&mut self) -> Result<String, SyntaxError> {
        let kind = self.peek();
        if kind.is_action() || kind == TokenKind::Star {
            Ok(self.advance().text)
        } else {
            Err(self.err(format!(
                "expected an action (read, write, modify, start, stop, deploy, delete, execute or *), found {}",
                self.cur().describe()
            )))
        }
    }

    fn parse_action_list(&mut self) -> Result<Vec<String>, SyntaxError> {
        let mut actions = vec![self.parse_action()?];
        while self.eat(TokenKind::Comma) {
            actions.push(self.parse_action()?);
        }
        Ok(actions)
    }

    fn parse_resource_list(&mut self) -> Result<Vec<ResourceRef>, SyntaxError> {
        let mut refs = vec![self.parse_resource_ref()?];
        while self.eat(TokenKind::Comma) {
            refs.push(self.parse_resource_ref()?);
        }
        Ok(refs)
    }

    fn parse_resource_ref(&mut self) -> Result<ResourceRef, SyntaxError> {
        if self.peek() == TokenKind::StringLit {
            let t = self.advance();
            return Ok(ResourceRef::Quoted(unescape(&t.text)));
        }
        let first = self.peek();
        if !(is_word_token(first) || first == TokenKind::Star) {
            return Err(self.err(format!(
                "expected a resource reference, found {}",
                self.cur().describe()
            )));
        }
        let mut segments = vec![self.advance().text];
        while self.eat(TokenKind::Dot) {
            let kind = self.peek();
            if is_word_token(kind) || kind == TokenKind::Star {
                segments.push(self.advance().text);
            } else {
                return Err(self.err(format!(
                    "expected a name or '*' after '.', found {}",
                    self.cur().describe()
                )));
            }
        }
        Ok(ResourceRef::Dotted(segments))
    }

    /// `[a, b, c]`; an empty list is accepted.
    fn parse_ident_list(&mut self, what: &str) -> Result<Vec<String>, SyntaxError> {
        self.expect(TokenKind::LBracket, "'['")?;
        let mut names = Vec::new();
        if self.peek() != TokenKind::RBracket {
            names.push(self.take_ident(what)?);
            while self.eat(TokenKind::Comma) {
                names.push(self.take_ident(what)?);
            }
        }
        self.expect(TokenKind::RBracket, "',' or ']'")?;
        Ok(names)
    }
}

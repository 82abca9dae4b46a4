//! Recursive-descent parser producing the `spec.md` §6 `ParsedProgram`
//! contract from QubecTalk-like source text. This is the one concrete
//! front-end shipped with the core (`spec.md` §A); its surface syntax is
//! a simple, hand-rolled convention, not a reproduction of any reference
//! grammar file.

use super::lexer::{Lexer, Spanned, Token};
use super::number::parse_number_literal;
use crate::error::{CoreResult, ParseError};
use crate::num::Num;
use crate::ops::{During, DuringBound, Operation};
use crate::program::{ParsedApplication, ParsedSubstance, Policy, Program, Scenario};
use crate::state::RecoveryStage;

pub fn parse_program(source: &str) -> CoreResult<Program> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> crate::error::CoreError {
        ParseError::new(format!("line {}", self.line()), message.into()).into()
    }

    fn is_ident(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s == word)
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if self.is_ident(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self, word: &str) -> CoreResult<()> {
        if self.eat_ident(word) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{word}', found {:?}", self.peek())))
        }
    }

    fn any_ident(&mut self) -> CoreResult<String> {
        match self.advance() {
            Token::Ident(s) => Ok(s),
            other => Err(self.err(format!("expected identifier, found {other:?}"))),
        }
    }

    fn any_string(&mut self) -> CoreResult<String> {
        match self.advance() {
            Token::Str(s) => Ok(s),
            other => Err(self.err(format!("expected a quoted string, found {other:?}"))),
        }
    }

    fn eat_symbol(&mut self, c: char) -> bool {
        if matches!(self.peek(), Token::Symbol(s) if *s == c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, c: char) -> CoreResult<()> {
        if self.eat_symbol(c) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{c}', found {:?}", self.peek())))
        }
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    // -- Top level ------------------------------------------------------

    fn parse_program(&mut self) -> CoreResult<Program> {
        let mut program = Program::default();
        while !self.at_eof() {
            if self.is_ident("default") {
                self.advance();
                let applications = self.parse_applications("default")?;
                program.policies.push(Policy {
                    name: "default".to_string(),
                    applications,
                });
            } else if self.eat_ident("policy") {
                let name = self.any_string()?;
                let applications = self.parse_applications("policy")?;
                program.policies.push(Policy { name, applications });
            } else if self.eat_ident("scenario") {
                program.scenarios.push(self.parse_scenario()?);
            } else {
                return Err(self.err(format!("expected 'default', 'policy', or 'scenario', found {:?}", self.peek())));
            }
        }
        Ok(program)
    }

    fn parse_applications(&mut self, closing: &str) -> CoreResult<Vec<ParsedApplication>> {
        let mut applications = Vec::new();
        while self.eat_ident("application") {
            let name = self.any_string()?;
            let substances = self.parse_substances()?;
            self.expect_ident("end")?;
            self.expect_ident("application")?;
            applications.push(ParsedApplication { name, substances });
        }
        self.expect_ident("end")?;
        self.expect_ident(closing)?;
        Ok(applications)
    }

    fn parse_substances(&mut self) -> CoreResult<Vec<ParsedSubstance>> {
        let mut substances = Vec::new();
        while self.eat_ident("substance") {
            let name = self.any_string()?;
            let mut operations = Vec::new();
            while !self.is_ident("end") {
                operations.push(self.parse_statement()?);
            }
            self.expect_ident("end")?;
            self.expect_ident("substance")?;
            substances.push(ParsedSubstance { name, operations });
        }
        Ok(substances)
    }

    fn parse_scenario(&mut self) -> CoreResult<Scenario> {
        let name = self.any_string()?;
        let mut policies = Vec::new();
        let mut start_year = None;
        let mut end_year = None;
        let mut trials = 1;
        while !self.is_ident("end") {
            if self.eat_ident("policy") {
                policies.push(self.any_string()?);
            } else if self.eat_ident("start") {
                self.expect_ident("year")?;
                start_year = Some(self.any_number_i64()?);
            } else if self.eat_ident("endYear") {
                end_year = Some(self.any_number_i64()?);
            } else if self.eat_ident("trials") {
                trials = self.any_number_i64()? as u32;
            } else {
                return Err(self.err(format!("unexpected token in scenario body: {:?}", self.peek())));
            }
        }
        self.expect_ident("end")?;
        self.expect_ident("scenario")?;
        Ok(Scenario {
            name,
            policies,
            start_year: start_year.ok_or_else(|| self.err("scenario missing 'start year'"))?,
            end_year: end_year.ok_or_else(|| self.err("scenario missing 'endYear'"))?,
            trials,
        })
    }

    fn any_number_i64(&mut self) -> CoreResult<i64> {
        match self.advance() {
            Token::Number(s) => {
                let d = parse_number_literal(&s)?;
                Ok(d.try_into().map_err(|_| self.err("expected an integer year"))?)
            }
            other => Err(self.err(format!("expected a number, found {other:?}"))),
        }
    }

    // -- Statements -------------------------------------------------------

    fn parse_statement(&mut self) -> CoreResult<Operation> {
        if self.eat_ident("enable") {
            let stream = self.any_ident()?;
            let during = self.parse_optional_during()?;
            return Ok(Operation::Enable { stream, during });
        }
        if self.eat_ident("equals") {
            let expr = Box::new(self.parse_expr()?);
            let during = self.parse_optional_during()?;
            return Ok(Operation::Equals { expr, during });
        }
        if self.eat_ident("initial") {
            self.expect_ident("charge")?;
            let expr = Box::new(self.parse_expr()?);
            self.expect_ident("for")?;
            let stream = self.any_ident()?;
            let during = self.parse_optional_during()?;
            return Ok(Operation::InitialCharge { stream, expr, during });
        }
        if self.eat_ident("set") {
            let stream = self.any_ident()?;
            self.expect_ident("to")?;
            let expr = Box::new(self.parse_expr()?);
            let during = self.parse_optional_during()?;
            return Ok(Operation::Set { stream, expr, during });
        }
        if self.eat_ident("change") {
            let stream = self.any_ident()?;
            self.expect_ident("by")?;
            let expr = Box::new(self.parse_expr()?);
            let during = self.parse_optional_during()?;
            return Ok(Operation::Change { stream, expr, during });
        }
        if self.eat_ident("cap") {
            let stream = self.any_ident()?;
            self.expect_ident("to")?;
            let expr = Box::new(self.parse_expr()?);
            let displace = self.parse_optional_displacing()?;
            let during = self.parse_optional_during()?;
            return Ok(Operation::Cap { stream, expr, displace, during });
        }
        if self.eat_ident("floor") {
            let stream = self.any_ident()?;
            self.expect_ident("to")?;
            let expr = Box::new(self.parse_expr()?);
            let displace = self.parse_optional_displacing()?;
            let during = self.parse_optional_during()?;
            return Ok(Operation::Floor { stream, expr, displace, during });
        }
        if self.eat_ident("recharge") {
            let pct = Box::new(self.parse_expr()?);
            self.expect_ident("with")?;
            let vol_per_unit = Box::new(self.parse_expr()?);
            let during = self.parse_optional_during()?;
            return Ok(Operation::Recharge { pct, vol_per_unit, during });
        }
        if self.eat_ident("recover") {
            let volume = Box::new(self.parse_expr()?);
            self.expect_ident("with")?;
            let reuse_yield = Box::new(self.parse_expr()?);
            self.eat_ident("reuse");
            let stage = if self.eat_ident("stage") {
                let name = self.any_ident()?;
                Some(match name.as_str() {
                    "eol" | "EOL" => RecoveryStage::Eol,
                    "recharge" | "RECHARGE" => RecoveryStage::Recharge,
                    other => return Err(self.err(format!("unknown recovery stage '{other}'"))),
                })
            } else {
                None
            };
            let induction = if self.eat_ident("induction") {
                Some(Box::new(self.parse_expr()?))
            } else {
                None
            };
            let during = self.parse_optional_during()?;
            return Ok(Operation::Recover {
                volume,
                reuse_yield,
                stage,
                induction,
                during,
            });
        }
        if self.eat_ident("replace") {
            let volume = Box::new(self.parse_expr()?);
            self.expect_ident("of")?;
            let stream = self.any_ident()?;
            self.expect_ident("with")?;
            let dest_substance = self.any_string()?;
            let during = self.parse_optional_during()?;
            return Ok(Operation::Replace {
                volume,
                stream,
                dest_substance,
                during,
            });
        }
        if self.eat_ident("retireWithReplacement") {
            let amount = Box::new(self.parse_expr()?);
            let during = self.parse_optional_during()?;
            return Ok(Operation::RetireWithReplacement { amount, during });
        }
        if self.eat_ident("retire") {
            let amount = Box::new(self.parse_expr()?);
            let during = self.parse_optional_during()?;
            return Ok(Operation::Retire { amount, during });
        }

        Err(self.err(format!("unrecognized statement keyword: {:?}", self.peek())))
    }

    fn parse_optional_displacing(&mut self) -> CoreResult<Option<String>> {
        if self.eat_ident("displacing") {
            Ok(Some(self.any_string()?))
        } else {
            Ok(None)
        }
    }

    fn parse_optional_during(&mut self) -> CoreResult<Option<During>> {
        if !self.eat_ident("during") {
            return Ok(None);
        }
        let start = self.parse_during_bound()?;
        self.expect_ident("to")?;
        let end = self.parse_during_bound()?;
        Ok(Some(During { start, end }))
    }

    fn parse_during_bound(&mut self) -> CoreResult<Option<DuringBound>> {
        if self.eat_ident("beginning") {
            return Ok(Some(DuringBound::Beginning));
        }
        if self.eat_ident("onwards") {
            return Ok(Some(DuringBound::Onwards));
        }
        if self.eat_ident("year") {
            let y = self.any_number_i64()?;
            return Ok(Some(DuringBound::Year(y)));
        }
        Ok(Some(DuringBound::Expr(Box::new(self.parse_expr()?))))
    }

    // -- Expressions ------------------------------------------------------
    // Precedence (low to high): `if/then/else`, `or`/`xor`, `and`,
    // equality, relational, additive, multiplicative, power, unary, atom.

    fn parse_expr(&mut self) -> CoreResult<Operation> {
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> CoreResult<Operation> {
        if self.eat_ident("if") {
            let cond = Box::new(self.parse_or()?);
            self.expect_ident("then")?;
            let then_op = Box::new(self.parse_conditional()?);
            self.expect_ident("else")?;
            let else_op = Box::new(self.parse_conditional()?);
            return Ok(Operation::Conditional(cond, then_op, else_op));
        }
        self.parse_or()
    }

    fn parse_or(&mut self) -> CoreResult<Operation> {
        let mut lhs = self.parse_and()?;
        loop {
            if self.eat_ident("or") {
                lhs = Operation::Or(Box::new(lhs), Box::new(self.parse_and()?));
            } else if self.eat_ident("xor") {
                lhs = Operation::Xor(Box::new(lhs), Box::new(self.parse_and()?));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_and(&mut self) -> CoreResult<Operation> {
        let mut lhs = self.parse_equality()?;
        while self.eat_ident("and") {
            lhs = Operation::And(Box::new(lhs), Box::new(self.parse_equality()?));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> CoreResult<Operation> {
        let mut lhs = self.parse_relational()?;
        loop {
            if self.eat_symbol('=') && self.eat_symbol('=') {
                lhs = Operation::Eq(Box::new(lhs), Box::new(self.parse_relational()?));
            } else if self.eat_symbol('!') && self.eat_symbol('=') {
                lhs = Operation::Ne(Box::new(lhs), Box::new(self.parse_relational()?));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_relational(&mut self) -> CoreResult<Operation> {
        let mut lhs = self.parse_additive()?;
        loop {
            if self.eat_symbol('<') {
                if self.eat_symbol('=') {
                    lhs = Operation::Le(Box::new(lhs), Box::new(self.parse_additive()?));
                } else {
                    lhs = Operation::Lt(Box::new(lhs), Box::new(self.parse_additive()?));
                }
            } else if self.eat_symbol('>') {
                if self.eat_symbol('=') {
                    lhs = Operation::Ge(Box::new(lhs), Box::new(self.parse_additive()?));
                } else {
                    lhs = Operation::Gt(Box::new(lhs), Box::new(self.parse_additive()?));
                }
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_additive(&mut self) -> CoreResult<Operation> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            if self.eat_symbol('+') {
                lhs = Operation::Add(Box::new(lhs), Box::new(self.parse_multiplicative()?));
            } else if self.eat_symbol('-') {
                lhs = Operation::Sub(Box::new(lhs), Box::new(self.parse_multiplicative()?));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_multiplicative(&mut self) -> CoreResult<Operation> {
        let mut lhs = self.parse_power()?;
        loop {
            if self.eat_symbol('*') {
                lhs = Operation::Mul(Box::new(lhs), Box::new(self.parse_power()?));
            } else if self.eat_symbol('/') {
                lhs = Operation::Div(Box::new(lhs), Box::new(self.parse_power()?));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_power(&mut self) -> CoreResult<Operation> {
        let base = self.parse_unary()?;
        if self.eat_symbol('^') {
            let exp = self.parse_power()?;
            return Ok(Operation::Pow(Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> CoreResult<Operation> {
        if self.eat_symbol('-') {
            let inner = self.parse_unary()?;
            return Ok(Operation::Sub(
                Box::new(Operation::PreCalculated(Num::dimensionless(rust_decimal::Decimal::ZERO))),
                Box::new(inner),
            ));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> CoreResult<Operation> {
        if self.eat_symbol('(') {
            let inner = self.parse_expr()?;
            self.expect_symbol(')')?;
            return Ok(inner);
        }
        if let Token::Number(raw) = self.peek().clone() {
            self.advance();
            let value = parse_number_literal(&raw)?;
            let units = self.parse_optional_unit_suffix()?;
            return Ok(Operation::PreCalculated(Num::new(value, units)));
        }
        if self.eat_ident("var") {
            let name = self.any_ident()?;
            return Ok(Operation::GetVariable(name));
        }
        if self.eat_ident("let") {
            let name = self.any_ident()?;
            self.expect_symbol('=')?;
            let expr = Box::new(self.parse_expr()?);
            return Ok(Operation::DefineVariable { name, expr });
        }
        if self.eat_ident("normal") {
            let mean = Box::new(self.parse_unary()?);
            self.expect_ident("std")?;
            let std = Box::new(self.parse_unary()?);
            return Ok(Operation::DrawNormal { mean, std });
        }
        if self.eat_ident("uniform") {
            let low = Box::new(self.parse_unary()?);
            self.expect_ident("to")?;
            let high = Box::new(self.parse_unary()?);
            return Ok(Operation::DrawUniform { low, high });
        }
        if self.eat_ident("get") {
            let name = self.any_ident()?;
            let substance = if self.eat_ident("of") {
                Some(self.any_string()?)
            } else {
                None
            };
            let convert_to = if self.eat_ident("as") {
                Some(self.parse_unit_string()?)
            } else {
                None
            };
            return Ok(Operation::GetStream {
                name,
                convert_to,
                substance,
            });
        }
        if let Token::Ident(name) = self.peek().clone() {
            // A bare identifier at atom position is sugar for `get <name>`.
            if matches!(
                name.as_str(),
                "domestic" | "import" | "export" | "sales" | "recycle" | "recycleRecharge" | "equipment"
                    | "priorEquipment" | "newEquipment" | "rechargeEmissions" | "eolEmissions" | "consumption"
                    | "bank" | "priorBank"
            ) {
                self.advance();
                return Ok(Operation::GetStream {
                    name,
                    convert_to: None,
                    substance: None,
                });
            }
        }

        Err(self.err(format!("expected an expression, found {:?}", self.peek())))
    }

    /// A bare unit may follow a number literal directly, e.g. `100 kg`,
    /// `5 %`, `10 kg / unit`.
    fn parse_optional_unit_suffix(&mut self) -> CoreResult<String> {
        if self.eat_symbol('%') {
            return Ok("%".to_string());
        }
        if let Token::Ident(_) = self.peek() {
            return self.parse_unit_string();
        }
        Ok(String::new())
    }

    fn parse_unit_string(&mut self) -> CoreResult<String> {
        if self.eat_symbol('%') {
            return Ok("%".to_string());
        }
        let numerator = self.any_ident()?;
        if self.eat_symbol('/') {
            let denominator = self.any_ident()?;
            Ok(format!("{numerator}/{denominator}"))
        } else if self.eat_ident("each") {
            let denominator = self.any_ident()?;
            Ok(format!("{numerator}/{denominator}"))
        } else {
            Ok(numerator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_program() {
        let src = r#"
default
  application "Domestic Refrigeration"
    substance "HFC-134a"
      enable domestic
      initial charge 10 kg / unit for domestic
      set domestic to 100 kg
      equals 1430 kgCO2e / kg
    end substance
  end application
end default

scenario "BAU"
  start year 1
  endYear 5
  trials 1
end scenario
"#;
        let program = parse_program(src).unwrap();
        assert_eq!(program.policies.len(), 1);
        assert_eq!(program.policies[0].applications.len(), 1);
        assert_eq!(program.policies[0].applications[0].substances.len(), 1);
        assert_eq!(program.policies[0].applications[0].substances[0].operations.len(), 4);
        assert_eq!(program.scenarios.len(), 1);
        assert_eq!(program.scenarios[0].start_year, 1);
        assert_eq!(program.scenarios[0].end_year, 5);
    }

    #[test]
    fn parses_cap_with_displacing_and_during() {
        let src = r#"
default
  application "A"
    substance "S"
      cap domestic to 100 kg displacing "Other" during year 2 to onwards
    end substance
  end application
end default
scenario "BAU"
  start year 1
  endYear 3
  trials 1
end scenario
"#;
        let program = parse_program(src).unwrap();
        let op = &program.policies[0].applications[0].substances[0].operations[0];
        match op {
            Operation::Cap { displace, during, .. } => {
                assert_eq!(displace.as_deref(), Some("Other"));
                assert!(during.is_some());
            }
            other => panic!("expected Cap, got {other:?}"),
        }
    }
}

//! 指标取值与逐指标隔离
//!
//! 单次执行中每个指标的失败互相独立：缺少协议映射、路径无效、值无法解析或转换失败
//! 都只记录为该指标的一条错误，不会中断其他指标的采集。

use tracing::debug;

use crate::models::{CollectionContext, CollectionResult, MetricDefinition, MetricProtocolMapping};

/// 将原始值转换为数值
///
/// 数值直接使用；字符串按与区域无关的十进制格式解析；其他类型视为失败。
pub fn coerce_value(raw: &serde_json::Value) -> Result<f64, String> {
    let value = match raw {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("数值超出范围: {n}"))?,
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("无法将字符串解析为数值: {s:?}"))?,
        serde_json::Value::Null => return Err("值为空".to_string()),
        other => return Err(format!("不支持的值类型: {other}")),
    };
    if !value.is_finite() {
        return Err(format!("值不是有限数值: {value}"));
    }
    Ok(value)
}

/// 协议映射上的取值转换表达式
///
/// 支持 `value` 变量、数字字面量、`+ - * /` 和括号，例如 `value / 1024 / 1024`。
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTransform {
    expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Value,
    Number(f64),
    Neg(Box<Expr>),
    Binary(Box<Expr>, Op, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Value,
    Number(f64),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| format!("无效的数字: {literal}"))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                if ident != "value" {
                    return Err(format!("未知的标识符: {ident}"));
                }
                tokens.push(Token::Value);
            }
            other => return Err(format!("无效的字符: {other}")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expression(&mut self) -> Result<Expr, String> {
        let mut left = self.term()?;
        while let Some(Token::Op(c @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let op = if c == '+' { Op::Add } else { Op::Sub };
            let right = self.term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut left = self.factor()?;
        while let Some(Token::Op(c @ ('*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let op = if c == '*' { Op::Mul } else { Op::Div };
            let right = self.factor()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Value) => Ok(Expr::Value),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Op('-')) => Ok(Expr::Neg(Box::new(self.factor()?))),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("缺少右括号".to_string()),
                }
            }
            Some(other) => Err(format!("意外的符号: {other:?}")),
            None => Err("表达式不完整".to_string()),
        }
    }
}

impl ValueTransform {
    pub fn parse(expression: &str) -> Result<Self, String> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Err("转换表达式为空".to_string());
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expression()?;
        if parser.pos < parser.tokens.len() {
            return Err(format!("表达式存在多余内容: {expression}"));
        }
        Ok(Self { expr })
    }

    pub fn apply(&self, value: f64) -> Result<f64, String> {
        let result = eval(&self.expr, value)?;
        if !result.is_finite() {
            return Err(format!("转换结果不是有限数值: {result}"));
        }
        Ok(result)
    }
}

fn eval(expr: &Expr, value: f64) -> Result<f64, String> {
    match expr {
        Expr::Value => Ok(value),
        Expr::Number(n) => Ok(*n),
        Expr::Neg(inner) => Ok(-eval(inner, value)?),
        Expr::Binary(left, op, right) => {
            let l = eval(left, value)?;
            let r = eval(right, value)?;
            match op {
                Op::Add => Ok(l + r),
                Op::Sub => Ok(l - r),
                Op::Mul => Ok(l * r),
                Op::Div if r == 0.0 => Err("除数为零".to_string()),
                Op::Div => Ok(l / r),
            }
        }
    }
}

/// 根据协议映射把原始值解析为最终指标值
pub fn resolve_metric_value(
    raw: &serde_json::Value,
    mapping: &MetricProtocolMapping,
) -> Result<f64, String> {
    let value = coerce_value(raw)?;
    match mapping.expression.as_deref().map(str::trim) {
        None | Some("") => Ok(value),
        Some(expression) => ValueTransform::parse(expression)
            .and_then(|transform| transform.apply(value))
            .map_err(|e| format!("转换表达式 '{expression}' 执行失败: {e}")),
    }
}

/// 逐个指标取值并写入结果
///
/// `fetch` 根据指标和协议映射返回原始值；任何一步失败都只记录为该指标的错误。
pub fn collect_metrics<F>(context: &CollectionContext, result: &mut CollectionResult, mut fetch: F)
where
    F: FnMut(&MetricDefinition, &MetricProtocolMapping) -> Result<serde_json::Value, String>,
{
    for metric in &context.metrics {
        let Some(mapping) = context.mapping_for(metric.id) else {
            result.add_metric_error(metric.id, "没有配置协议映射");
            continue;
        };

        let value = fetch(metric, mapping).and_then(|raw| resolve_metric_value(&raw, mapping));
        match value {
            Ok(value) => result.add_metric_data(context.metric_data(metric, value)),
            Err(message) => {
                debug!(
                    task_id = context.task_id,
                    metric_id = metric.id,
                    error = %message,
                    "指标采集失败"
                );
                result.add_metric_error(metric.id, message);
            }
        }
    }
}

//! 配置文档读取：把 XML 配置文本解析成带属性的命名节点树
//! 结构化规则加载器只依赖这棵树，不直接接触 XML 事件

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{RsmResult, RsmimeError};

/// 配置节点
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// 直接文本内容（已反转义，未裁剪空白）
    pub text: String,
    pub children: Vec<ConfigNode>,
}

impl ConfigNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&ConfigNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ConfigNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// 子节点的裁剪后文本
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(ConfigNode::trimmed_text)
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

/// 配置树读取器
pub struct ConfigTreeReader;

impl ConfigTreeReader {
    /// 解析完整文档，返回根节点
    pub fn parse(text: &str) -> RsmResult<ConfigNode> {
        let mut reader = Reader::from_str(text);
        let mut stack: Vec<ConfigNode> = Vec::new();
        let mut root: Option<ConfigNode> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(Self::open(&start)?),
                Event::Empty(start) => {
                    let node = Self::open(&start)?;
                    Self::attach(&mut stack, &mut root, node)?;
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| RsmimeError::XmlError("出现多余的结束标签".to_string()))?;
                    Self::attach(&mut stack, &mut root, node)?;
                }
                Event::Text(text) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(cdata) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&String::from_utf8_lossy(&cdata));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(RsmimeError::XmlError(format!("元素 <{}> 未闭合", open.name)));
        }
        root.ok_or_else(|| RsmimeError::XmlError("文档没有根元素".to_string()))
    }

    fn open(start: &BytesStart) -> RsmResult<ConfigNode> {
        let mut node = ConfigNode::new(String::from_utf8_lossy(start.name().as_ref()));
        for attr in start.attributes() {
            let attr = attr.map_err(|e| RsmimeError::XmlError(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            node.attributes.push((key, value));
        }
        Ok(node)
    }

    fn attach(stack: &mut [ConfigNode], root: &mut Option<ConfigNode>, node: ConfigNode) -> RsmResult<()> {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        } else if root.is_none() {
            *root = Some(node);
        } else {
            return Err(RsmimeError::XmlError("文档存在多个根元素".to_string()));
        }
        Ok(())
    }
}

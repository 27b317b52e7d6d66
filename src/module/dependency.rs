//! 模块依赖图
//!
//! 维护模块间的依赖关系（正向与反向边），计算激活顺序并检测循环依赖。
//!
//! # 示例
//!
//! ```rust
//! use module_kernel::module::dependency::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.upsert("sales", &["inventory".to_string()]);
//! graph.upsert("inventory", &[]);
//!
//! assert_eq!(graph.dependents("inventory"), vec!["sales".to_string()]);
//! assert_eq!(
//!     graph.topological_order().unwrap(),
//!     vec!["inventory".to_string(), "sales".to_string()]
//! );
//! ```

use std::collections::{HashMap, HashSet};

use crate::utils::{CoreError, Result};

#[derive(Debug, Clone, Default)]
struct DependencyNode {
    dependencies: Vec<String>,
    dependents: Vec<String>,
}

/// 模块依赖图
///
/// 节点按首次出现的顺序保存，拓扑排序以此顺序作为遍历起点。
/// 对每条边 `A 依赖 B`，`B` 的依赖者中必然包含 `A`。
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, DependencyNode>,
    order: Vec<String>,
}

impl DependencyGraph {
    /// 创建空的依赖图
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_node(&mut self, module_id: &str) -> &mut DependencyNode {
        if !self.nodes.contains_key(module_id) {
            self.order.push(module_id.to_string());
        }
        self.nodes.entry(module_id.to_string()).or_default()
    }

    /// 插入或更新模块的依赖
    ///
    /// 已存在的模块会先移除旧的出边。依赖中尚未出现的模块会自动创建节点。
    pub fn upsert(&mut self, module_id: &str, dependencies: &[String]) {
        let previous = std::mem::take(&mut self.ensure_node(module_id).dependencies);
        for dep in &previous {
            if let Some(node) = self.nodes.get_mut(dep) {
                node.dependents.retain(|d| d != module_id);
            }
        }

        let mut unique = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !unique.contains(dep) {
                unique.push(dep.clone());
            }
        }

        for dep in &unique {
            let node = self.ensure_node(dep);
            if !node.dependents.iter().any(|d| d == module_id) {
                node.dependents.push(module_id.to_string());
            }
        }
        self.ensure_node(module_id).dependencies = unique;
    }

    /// 移除模块及其相关的所有边
    pub fn remove_module(&mut self, module_id: &str) -> bool {
        let Some(node) = self.nodes.remove(module_id) else {
            return false;
        };

        for dep in &node.dependencies {
            if let Some(dep_node) = self.nodes.get_mut(dep) {
                dep_node.dependents.retain(|d| d != module_id);
            }
        }
        for dependent in &node.dependents {
            if let Some(dependent_node) = self.nodes.get_mut(dependent) {
                dependent_node.dependencies.retain(|d| d != module_id);
            }
        }
        self.order.retain(|id| id != module_id);
        true
    }

    /// 是否包含模块
    pub fn contains(&self, module_id: &str) -> bool {
        self.nodes.contains_key(module_id)
    }

    /// 模块的直接依赖
    pub fn dependencies(&self, module_id: &str) -> Vec<String> {
        self.nodes
            .get(module_id)
            .map(|n| n.dependencies.clone())
            .unwrap_or_default()
    }

    /// 直接依赖该模块的模块
    pub fn dependents(&self, module_id: &str) -> Vec<String> {
        self.nodes
            .get(module_id)
            .map(|n| n.dependents.clone())
            .unwrap_or_default()
    }

    /// 模块的全部传递依赖（依赖在前）
    pub fn all_dependencies(&self, module_id: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(module_id.to_string());
        self.collect_dependencies(module_id, &mut visited, &mut result);
        result
    }

    fn collect_dependencies(
        &self,
        module_id: &str,
        visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        for dep in self.dependencies(module_id) {
            if visited.insert(dep.clone()) {
                self.collect_dependencies(&dep, visited, result);
                result.push(dep);
            }
        }
    }

    /// 计算拓扑顺序（依赖在前，依赖者在后）
    ///
    /// # Errors
    ///
    /// 存在环时返回 `CoreError::CircularDependency`，附带环路径
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        let mut result = Vec::with_capacity(self.order.len());

        for module_id in &self.order {
            self.visit(module_id, &mut visited, &mut path, &mut result)?;
        }
        Ok(result)
    }

    fn visit(
        &self,
        module_id: &str,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
        result: &mut Vec<String>,
    ) -> Result<()> {
        if visited.contains(module_id) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|id| id == module_id) {
            let mut cycle = path[start..].to_vec();
            cycle.push(module_id.to_string());
            return Err(CoreError::CircularDependency(cycle.join(" -> ")));
        }

        path.push(module_id.to_string());
        for dep in self.dependencies(module_id) {
            self.visit(&dep, visited, path, result)?;
        }
        path.pop();

        visited.insert(module_id.to_string());
        result.push(module_id.to_string());
        Ok(())
    }

    /// 停用顺序（拓扑顺序的逆序）
    pub fn deactivation_order(&self) -> Result<Vec<String>> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }

    /// 查找一个环，返回环上的模块（首尾相同）
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        match self.topological_order() {
            Err(CoreError::CircularDependency(path)) => {
                Some(path.split(" -> ").map(str::to_string).collect())
            }
            _ => None,
        }
    }

    /// 是否存在环
    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// 全部模块（按首次出现顺序）
    pub fn modules(&self) -> &[String] {
        &self.order
    }

    /// 模块数量
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 清空依赖图
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.order.clear();
    }
}
